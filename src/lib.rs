//! Audio-reactive four-lane rhythm game: the scroll speed and note cadence
//! follow the live bass energy of the music being played.

pub mod config;
pub mod core;
pub mod game;
