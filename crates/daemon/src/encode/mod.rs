//! Encoding modules for Transcode Watcher

pub mod handbrake;

pub use handbrake::{build_handbrake_command, HandbrakeParams};
