//! Watch configuration

use std::net::SocketAddr;
use std::path::Path;

use detector::DetectorConfig;
use perception::PreprocessConfig;
use serde::{Deserialize, Serialize};
use speed_limit::LifecycleConfig;

use crate::WatchError;

/// Environment variable prefix, e.g. `SPEEDSIGN__DETECTOR__ESCAPE_MARGIN=0.05`
pub const ENV_PREFIX: &str = "SPEEDSIGN";

/// Complete configuration of the sign watch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub detector: DetectorConfig,
    pub lifecycle: LifecycleConfig,
    pub preprocess: PreprocessConfig,
    pub engine: EngineConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Event loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the serialized input queue. Frames beyond it are dropped.
    pub inbox_capacity: usize,
    /// Capacity of the presentation event queue
    pub outbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 8,
            outbox_capacity: 64,
        }
    }
}

/// Synthetic frame source used by the demo
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Stop after this many seconds (0 runs until interrupted)
    pub run_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 1280,
            height: 720,
            run_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape endpoint, disabled when unset
    pub listen: Option<SocketAddr>,
}

impl WatchConfig {
    /// Load from an optional TOML file, then `SPEEDSIGN__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, WatchError> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("speed-sign-watch").required(false)),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Reject settings the watch cannot run with
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.engine.inbox_capacity == 0 || self.engine.outbox_capacity == 0 {
            return Err(WatchError::InvalidConfig("queue capacities must be positive".into()));
        }
        if self.source.fps == 0 || self.source.width == 0 || self.source.height == 0 {
            return Err(WatchError::InvalidConfig(format!(
                "frame source {}x{} @ {} fps",
                self.source.width, self.source.height, self.source.fps
            )));
        }
        if self.detector.max_recognition_attempts == 0 {
            return Err(WatchError::InvalidConfig("max_recognition_attempts must be positive".into()));
        }
        if self.detector.call_timeout_frames == 0 {
            return Err(WatchError::InvalidConfig("call_timeout_frames must be positive".into()));
        }
        Ok(())
    }
}
