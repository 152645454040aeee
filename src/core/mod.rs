pub mod analysis;
pub mod audio;
pub mod gamepad;
pub mod input;
pub mod resample;
