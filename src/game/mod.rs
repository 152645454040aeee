pub mod gameplay;
pub mod judgment;
pub mod life;
pub mod motion;
pub mod note;
pub mod session;
pub mod song;
pub mod spawner;
pub mod speed;
pub mod timing;
