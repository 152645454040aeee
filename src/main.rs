use log::{LevelFilter, error, info, warn};
use neonlane::config;
use neonlane::core::audio;
use neonlane::game::song;
use std::error::Error;

mod app;

fn main() -> Result<(), Box<dyn Error>> {
    // --- Logging Setup ---
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .filter_module("neonlane::core::audio", LevelFilter::Info)
        .filter_module("neonlane::game", LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Application starting...");
    config::load();
    let config = config::get();

    if audio::init() {
        audio::set_volumes(config.music_volume, config.sfx_volume);
    } else {
        warn!("Running without audio output.");
    }

    let songs = song::load_or_default(&config.songs_file);
    let query = std::env::args().nth(1);
    let track = match query.as_deref() {
        Some(q) => song::find(&songs, q).cloned().unwrap_or_else(|| {
            warn!("No song matches '{}'; using '{}'.", q, songs[0].title);
            songs[0].clone()
        }),
        None => songs[0].clone(),
    };
    info!(
        "Selected '{}' by {} ({} BPM, {}).",
        track.title, track.artist, track.bpm, track.difficulty
    );

    if let Err(e) = app::run(track) {
        error!("Application exited with error: {}", e);
        return Err(e);
    }

    info!("Application exited gracefully.");
    Ok(())
}
