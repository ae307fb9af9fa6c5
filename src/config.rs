// Player configuration
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the player and its built-in engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Cadence of the periodic time callback, in milliseconds
    pub progress_interval_ms: u64,
    /// Depth of the output ring buffer, in milliseconds of audio
    pub ring_buffer_ms: u32,
    /// Connect timeout for remote sources, in milliseconds
    pub connect_timeout_ms: u64,
    /// Initial output volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 1000,
            ring_buffer_ms: 250,
            connect_timeout_ms: 10_000,
            volume: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
