/// Module configuration
use crate::error::Result;
use crate::pipeline::Levels;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest and longest crossfade overlap
pub const CROSSFADE_RANGE_MS: (u64, u64) = (2000, 5000);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModuleConfig {
    #[serde(default = "default_master_volume")]
    pub master_volume: f32,

    #[serde(default)]
    pub muted: bool,

    /// Host game volume while music plays
    #[serde(default = "default_host_duck_volume")]
    pub host_duck_volume: f32,

    #[serde(default = "default_duck_ease_secs")]
    pub duck_ease_secs: f32,

    /// Losing window focus forces StandBy
    #[serde(default = "default_true")]
    pub mute_when_in_background: bool,

    #[serde(default)]
    pub play_to_completion: bool,

    #[serde(default = "default_true")]
    pub crossfade: bool,

    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,

    #[serde(default = "default_end_of_stream_offset_ms")]
    pub end_of_stream_offset_ms: u64,

    /// `None` selects the system default output
    #[serde(default)]
    pub output_device: Option<String>,

    #[serde(default)]
    pub paused: bool,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub lock_probe_interval_ms: u64,

    #[serde(default = "default_combat_exit_short_ms")]
    pub combat_exit_short_ms: u64,

    #[serde(default = "default_combat_exit_long_ms")]
    pub combat_exit_long_ms: u64,

    #[serde(default = "default_device_retry_attempts")]
    pub device_retry_attempts: u32,

    #[serde(default = "default_device_retry_delay_ms")]
    pub device_retry_delay_ms: u64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Sentinel file the game holds open while the player is defeated
    #[serde(default)]
    pub defeated_lock_file: Option<PathBuf>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            master_volume: default_master_volume(),
            muted: false,
            host_duck_volume: default_host_duck_volume(),
            duck_ease_secs: default_duck_ease_secs(),
            mute_when_in_background: true,
            play_to_completion: false,
            crossfade: true,
            crossfade_ms: default_crossfade_ms(),
            end_of_stream_offset_ms: default_end_of_stream_offset_ms(),
            output_device: None,
            paused: false,
            tick_interval_ms: default_tick_interval_ms(),
            lock_probe_interval_ms: default_tick_interval_ms(),
            combat_exit_short_ms: default_combat_exit_short_ms(),
            combat_exit_long_ms: default_combat_exit_long_ms(),
            device_retry_attempts: default_device_retry_attempts(),
            device_retry_delay_ms: default_device_retry_delay_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            defeated_lock_file: None,
        }
    }
}

impl ModuleConfig {
    /// Load from an optional TOML file, overridden by `AMBIENCE__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path.filter(|p| p.exists()) {
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("AMBIENCE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_sources(settings.build()?)
    }

    pub fn from_sources(config: config::Config) -> Result<Self> {
        Ok(config.try_deserialize()?)
    }

    /// Crossfade overlap, clamped to the supported range
    pub fn crossfade_duration(&self) -> Duration {
        let (lo, hi) = CROSSFADE_RANGE_MS;
        Duration::from_millis(self.crossfade_ms.clamp(lo, hi))
    }

    /// Fade-in at the start of every session
    pub fn fade_in(&self) -> Duration {
        if self.crossfade {
            Duration::from_secs(2)
        } else {
            Duration::from_millis(500)
        }
    }

    /// Fade-out when disposing a session
    pub fn fade_out(&self, ended_naturally: bool) -> Duration {
        if self.crossfade && ended_naturally {
            self.crossfade_duration()
        } else {
            Duration::from_secs(2)
        }
    }

    pub fn end_of_stream_offset(&self) -> Duration {
        Duration::from_millis(self.end_of_stream_offset_ms)
    }

    /// Host volume ease; unusable values fall back to the default
    pub fn duck_ease(&self) -> Duration {
        Duration::try_from_secs_f32(self.duck_ease_secs)
            .unwrap_or_else(|_| Duration::from_secs_f32(default_duck_ease_secs()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn device_retry_delay(&self) -> Duration {
        Duration::from_millis(self.device_retry_delay_ms)
    }

    pub fn levels(&self) -> Levels {
        Levels {
            master_volume: self.master_volume.clamp(0.0, 1.0),
            muted: self.muted,
            host_output_scale: 1.0,
        }
    }
}

// Default values

fn default_master_volume() -> f32 {
    0.25
}

fn default_host_duck_volume() -> f32 {
    0.1
}

fn default_duck_ease_secs() -> f32 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_crossfade_ms() -> u64 {
    5000
}

fn default_end_of_stream_offset_ms() -> u64 {
    3000
}

fn default_tick_interval_ms() -> u64 {
    200
}

fn default_combat_exit_short_ms() -> u64 {
    3250
}

fn default_combat_exit_long_ms() -> u64 {
    20250
}

fn default_device_retry_attempts() -> u32 {
    3
}

fn default_device_retry_delay_ms() -> u64 {
    500
}

fn default_max_consecutive_failures() -> u32 {
    3
}
