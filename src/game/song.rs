use crate::game::speed::Difficulty;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SongError {
    #[error("failed to read song list '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed song list '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("song '{title}' is invalid: {reason}")]
    Invalid { title: String, reason: &'static str },
}

/// Metadata for one playable track. Immutable for the length of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub bpm: u32,
    pub src: PathBuf,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl TrackInfo {
    pub fn validate(&self) -> Result<(), SongError> {
        let invalid = |reason| SongError::Invalid {
            title: self.title.clone(),
            reason,
        };
        if self.bpm == 0 {
            return Err(invalid("bpm must be greater than zero"));
        }
        if self.src.as_os_str().is_empty() {
            return Err(invalid("missing audio source"));
        }
        Ok(())
    }
}

/// The three demo tracks shipped with the game.
pub fn default_song_list() -> Vec<TrackInfo> {
    let demo = |title: &str, artist: &str, bpm, src: &str, difficulty| TrackInfo {
        title: title.to_string(),
        artist: artist.to_string(),
        bpm,
        src: PathBuf::from(src),
        difficulty,
    };
    vec![
        demo("I Hate Me", "Lily.μ", 128, "songs/first_music.ogg", Difficulty::Easy),
        demo("Miuri", "Roce", 150, "songs/second_music.ogg", Difficulty::Hard),
        demo("NOTHING", "NULL_POINTER", 175, "songs/music.ogg", Difficulty::Hard),
    ]
}

/// Parses a JSON array of tracks. Entries that fail validation are dropped
/// with a warning; relative `src` paths resolve against the list's directory.
pub fn parse_song_list(text: &str, path: &Path) -> Result<Vec<TrackInfo>, SongError> {
    let raw: Vec<TrackInfo> = serde_json::from_str(text).map_err(|source| SongError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(raw
        .into_iter()
        .filter_map(|mut track| match track.validate() {
            Ok(()) => {
                if track.src.is_relative() {
                    track.src = base.join(&track.src);
                }
                Some(track)
            }
            Err(e) => {
                warn!("Skipping entry in '{}': {}", path.display(), e);
                None
            }
        })
        .collect())
}

pub fn load_song_list(path: &Path) -> Result<Vec<TrackInfo>, SongError> {
    let text = fs::read_to_string(path).map_err(|source| SongError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_song_list(&text, path)
}

/// Loads `path`, falling back to the built-in list when it is missing,
/// malformed or empty.
pub fn load_or_default(path: &Path) -> Vec<TrackInfo> {
    match load_song_list(path) {
        Ok(list) if !list.is_empty() => {
            info!("Loaded {} songs from '{}'.", list.len(), path.display());
            list
        }
        Ok(_) => {
            warn!("Song list '{}' is empty; using built-in songs.", path.display());
            default_song_list()
        }
        Err(e) => {
            warn!("{}; using built-in songs.", e);
            default_song_list()
        }
    }
}

/// Picks a track by 1-based index or by case-insensitive title.
pub fn find<'a>(songs: &'a [TrackInfo], query: &str) -> Option<&'a TrackInfo> {
    let query = query.trim();
    if let Ok(n) = query.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| songs.get(i));
    }
    songs.iter().find(|s| s.title.eq_ignore_ascii_case(query))
}
