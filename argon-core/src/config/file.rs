//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/argon/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    CaptureConfiguration, CaptureKind, FrameInterval, Preset, SessionConfig, DEFAULT_FPS,
    DEFAULT_QUEUE_DEPTH,
};
use crate::error::{ArgonError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Screen capture settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Session settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Audio output settings
    #[serde(default)]
    pub audio: AudioSettings,
}

/// Screen capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// What to capture (display, window)
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Output preset (e.g., "1080p60"); empty means native resolution
    #[serde(default)]
    pub preset: String,

    /// Framerate cap
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Frames buffered ahead of the consumer
    #[serde(default = "default_queue_depth")]
    pub queue_depth: u32,

    /// Display backing scale factor
    #[serde(default = "default_scale_factor")]
    pub scale_factor: u32,

    /// Hide our own windows from display captures
    #[serde(default = "default_true")]
    pub exclude_self: bool,

    /// Seconds between refreshes of the shareable content list
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Publish automatically once connected
    #[serde(default = "default_true")]
    pub auto_publish: bool,

    /// Seconds to wait for the transport to connect
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Audio output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Follow the system default output device while in a session
    #[serde(default = "default_true")]
    pub follow_default_output: bool,
    /// Node name of the playback stream to move between devices
    #[serde(default = "default_playback_stream")]
    pub playback_stream: String,
}

// Default value functions
fn default_kind() -> String {
    "display".to_string()
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_queue_depth() -> u32 {
    DEFAULT_QUEUE_DEPTH
}

fn default_scale_factor() -> u32 {
    1
}

fn default_refresh_secs() -> u64 {
    3
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_playback_stream() -> String {
    "argon-playback".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            preset: String::new(),
            fps: default_fps(),
            queue_depth: default_queue_depth(),
            scale_factor: default_scale_factor(),
            exclude_self: true,
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_publish: true,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            follow_default_output: true,
            playback_stream: default_playback_stream(),
        }
    }
}

impl CaptureSettings {
    /// Parsed capture kind
    pub fn capture_kind(&self) -> Result<CaptureKind> {
        self.kind.parse().map_err(ArgonError::config)
    }

    /// Parsed preset, if one is set
    pub fn preset(&self) -> Result<Option<Preset>> {
        if self.preset.is_empty() {
            return Ok(None);
        }
        self.preset.parse().map(Some).map_err(ArgonError::config)
    }

    /// Apply these settings on top of a platform-derived configuration
    pub fn apply_to(&self, config: CaptureConfiguration) -> Result<CaptureConfiguration> {
        let config = match self.preset()? {
            Some(preset) => config.with_preset(preset),
            None => config.with_frame_interval(FrameInterval::from_fps(self.fps)),
        };
        Ok(config.with_queue_depth(self.queue_depth))
    }
}

impl SessionSettings {
    /// Convert to the runtime session configuration
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            auto_publish: self.auto_publish,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("argon").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("argon")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/argon/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ArgonError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| ArgonError::Config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ArgonError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.to_toml()?;

        std::fs::write(&path, content)
            .map_err(|e| ArgonError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Serialize as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ArgonError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        Self::default().save_to(path)?;
        Ok(true)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Argon Configuration

[capture]
# What to share: display, window
kind = "display"

# Output preset: 720p30, 720p60, 1080p30, 1080p60, 1440p30, 1440p60, 4k30, 4k60
# Leave empty to capture at the source's native resolution
preset = ""

# Framerate cap when no preset is set
fps = 60

# Frames the compositor may buffer ahead of us; higher smooths bursts
# at the cost of latency and memory
queue_depth = 5

# Display backing scale factor (2 for HiDPI)
scale_factor = 1

# Hide Argon's own windows when sharing a display
exclude_self = true

# Seconds between refreshes of the display/window list
refresh_secs = 3

[session]
# Start publishing as soon as the session connects
auto_publish = true

# Seconds to wait for the session to connect
connect_timeout_secs = 30

[audio]
# Move playback to the new default output device when it changes
follow_default_output = true

# PipeWire node name of the playback stream that follows the default output
playback_stream = "argon-playback"
"#
    .to_string()
}
