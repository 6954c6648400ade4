// Engine configuration - Scheduling horizon, tick rate and audio device options
// Loaded from RON or JSON; every field has a default so partial files work

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Audio device options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; None selects the host default
    pub device_name: Option<String>,
    /// Capacity of the scheduler → audio command queue
    pub command_capacity: usize,
    /// Simultaneous click voices in the mixer
    pub max_voices: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            command_capacity: 1024,
            max_voices: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far ahead of the audio clock notes are scheduled
    pub lookahead_ms: u64,
    /// Period of the timing source that wakes the scheduler
    pub tick_interval_ms: u64,
    /// Delay between start() and the first note
    pub start_safety_ms: u64,
    /// Master gain fade length on start/stop
    pub gain_ramp_ms: u64,
    pub audio: AudioConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 100,
            tick_interval_ms: 25,
            start_safety_ms: 50,
            gain_ramp_ms: 10,
            audio: AudioConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a `.json` or `.ron` file (RON for any other extension)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => ron::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        // Otherwise a late tick leaves a gap with nothing scheduled
        if self.lookahead_ms <= self.tick_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "lookahead_ms ({}) must be larger than tick_interval_ms ({})",
                self.lookahead_ms, self.tick_interval_ms
            )));
        }
        if self.audio.command_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audio.command_capacity must be > 0".to_string(),
            ));
        }
        if self.audio.max_voices == 0 {
            return Err(ConfigError::Invalid(
                "audio.max_voices must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn start_safety_secs(&self) -> f64 {
        self.start_safety_ms as f64 / 1000.0
    }

    pub fn gain_ramp_secs(&self) -> f64 {
        self.gain_ramp_ms as f64 / 1000.0
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
