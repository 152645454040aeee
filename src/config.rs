use crate::core::input::{KeyBindings, keycode_from_name, keycode_name};
use configparser::ini::Ini;
use log::{info, warn};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

pub const WINDOW_TITLE: &str = "neonlane";
pub const CONFIG_INI_PATH: &str = "neonlane.ini";

const OPTIONS: &str = "Options";
const KEYS: &str = "Keys";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read '{path}': {message}")]
    Read { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub display_width: u32,
    pub display_height: u32,
    pub windowed: bool,
    pub music_volume: f32,
    pub sfx_volume: f32,
    pub songs_file: PathBuf,
    /// Fixed seed for the note generator; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub keys: KeyBindings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_width: 1280,
            display_height: 720,
            windowed: true,
            music_volume: 1.0,
            sfx_volume: 0.8,
            songs_file: PathBuf::from("songs.json"),
            seed: None,
            keys: KeyBindings::default(),
        }
    }
}

static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(Config::default()));

fn to_ini(config: &Config) -> Ini {
    let mut conf = Ini::new_cs();
    conf.set(OPTIONS, "DisplayWidth", Some(config.display_width.to_string()));
    conf.set(OPTIONS, "DisplayHeight", Some(config.display_height.to_string()));
    conf.set(OPTIONS, "Windowed", Some(if config.windowed { "1" } else { "0" }.to_string()));
    conf.set(OPTIONS, "MusicVolume", Some(format!("{:.2}", config.music_volume)));
    conf.set(OPTIONS, "SfxVolume", Some(format!("{:.2}", config.sfx_volume)));
    conf.set(
        OPTIONS,
        "SongsFile",
        Some(config.songs_file.to_string_lossy().into_owned()),
    );
    conf.set(
        OPTIONS,
        "Seed",
        Some(config.seed.map(|s| s.to_string()).unwrap_or_default()),
    );
    for (i, code) in config.keys.lanes.iter().enumerate() {
        conf.set(KEYS, &format!("Lane{i}"), Some(keycode_name(*code)));
    }
    conf
}

fn from_ini(conf: &Ini) -> Config {
    let default = Config::default();
    let parse_volume = |key: &str, fallback: f32| {
        conf.get(OPTIONS, key)
            .and_then(|v| v.trim().parse::<f32>().ok())
            .map_or(fallback, |v| v.clamp(0.0, 1.0))
    };

    let mut keys = default.keys.clone();
    for (i, slot) in keys.lanes.iter_mut().enumerate() {
        let key = format!("Lane{i}");
        if let Some(name) = conf.get(KEYS, &key) {
            match keycode_from_name(&name) {
                Some(code) => *slot = code,
                None => warn!("Unknown key '{}' for {}, keeping default.", name, key),
            }
        }
    }

    Config {
        display_width: conf
            .get(OPTIONS, "DisplayWidth")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default.display_width),
        display_height: conf
            .get(OPTIONS, "DisplayHeight")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default.display_height),
        windowed: conf
            .get(OPTIONS, "Windowed")
            .and_then(|v| v.trim().parse::<u8>().ok())
            .map_or(default.windowed, |v| v != 0),
        music_volume: parse_volume("MusicVolume", default.music_volume),
        sfx_volume: parse_volume("SfxVolume", default.sfx_volume),
        songs_file: conf
            .get(OPTIONS, "SongsFile")
            .filter(|v| !v.trim().is_empty())
            .map_or(default.songs_file, |v| PathBuf::from(v.trim())),
        seed: conf
            .get(OPTIONS, "Seed")
            .and_then(|v| v.trim().parse::<u64>().ok()),
        keys,
    }
}

fn create_default_file(path: &Path) -> Result<(), ConfigError> {
    info!("Config file not found, creating default '{}'.", path.display());
    to_ini(&Config::default())
        .write(path)
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Parses `path`, creating it with default values when it does not exist.
pub fn read_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        create_default_file(path)?;
        return Ok(Config::default());
    }
    let mut conf = Ini::new_cs();
    conf.load(path).map_err(|message| ConfigError::Read {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(from_ini(&conf))
}

/// Loads the global config from `neonlane.ini`. Failures are logged and the
/// defaults stay in place.
pub fn load() {
    let loaded = match read_from(Path::new(CONFIG_INI_PATH)) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using default options.", e);
            Config::default()
        }
    };
    info!(
        "Config loaded: {}x{}, music {:.2}, sfx {:.2}, songs '{}'.",
        loaded.display_width,
        loaded.display_height,
        loaded.music_volume,
        loaded.sfx_volume,
        loaded.songs_file.display()
    );
    *CONFIG.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
}

/// Returns a copy of the currently loaded config.
pub fn get() -> Config {
    CONFIG.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
