//! Configuration types for Argon
//!
//! Provides capture configuration, resolution presets and session settings.

pub mod file;

pub use file::{sample_config, AudioSettings, CaptureSettings, ConfigFile, SessionSettings};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::{DisplayInfo, WindowInfo};
use crate::types::FrameSize;

/// Frames the platform may buffer ahead of the consumer
pub const DEFAULT_QUEUE_DEPTH: u32 = 5;

/// Default capture framerate
pub const DEFAULT_FPS: u32 = 60;

/// Window captures are taken at twice the window's point size
pub const WINDOW_SCALE: u32 = 2;

/// Minimum spacing between captured frames, as a fraction of a second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameInterval {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameInterval {
    /// At most `fps` frames per second (0 means uncapped)
    pub fn from_fps(fps: u32) -> Self {
        Self {
            numerator: if fps == 0 { 0 } else { 1 },
            denominator: fps.max(1),
        }
    }

    /// Interval as a duration (zero means uncapped)
    pub fn as_duration(&self) -> Duration {
        if self.denominator == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.numerator as u64 * 1_000_000_000 / self.denominator as u64)
    }

    /// Framerate cap, rounded down (0 when uncapped)
    pub fn fps(&self) -> u32 {
        if self.numerator == 0 {
            0
        } else {
            self.denominator / self.numerator
        }
    }
}

impl Default for FrameInterval {
    fn default() -> Self {
        Self::from_fps(DEFAULT_FPS)
    }
}

impl std::fmt::Display for FrameInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.numerator, self.denominator)
    }
}

/// What kind of content to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// A whole display
    #[default]
    Display,
    /// A single window
    Window,
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Display => write!(f, "display"),
            Self::Window => write!(f, "window"),
        }
    }
}

impl std::str::FromStr for CaptureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "display" | "monitor" | "screen" => Ok(Self::Display),
            "window" => Ok(Self::Window),
            _ => Err(format!("Unknown capture kind: {}", s)),
        }
    }
}

/// The single display or window being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    Display(u32),
    Window(u32),
}

impl std::fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Display(id) => write!(f, "Display({})", id),
            Self::Window(id) => write!(f, "Window({})", id),
        }
    }
}

/// Selects exactly one capturable region plus exclusions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentFilter {
    /// A display, minus the windows of the listed applications
    Display {
        display_id: u32,
        /// Application ids whose windows are hidden from the capture
        #[serde(default)]
        excluded_apps: Vec<String>,
    },
    /// A single window, independent of the desktop around it
    Window { window_id: u32 },
}

impl ContentFilter {
    /// Capture a whole display
    pub fn display(display_id: u32) -> Self {
        Self::Display {
            display_id,
            excluded_apps: Vec::new(),
        }
    }

    /// Capture a single window
    pub fn window(window_id: u32) -> Self {
        Self::Window { window_id }
    }

    /// Hide windows of these applications (display captures only)
    pub fn excluding(self, apps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        match self {
            Self::Display {
                display_id,
                mut excluded_apps,
            } => {
                excluded_apps.extend(apps.into_iter().map(Into::into));
                Self::Display {
                    display_id,
                    excluded_apps,
                }
            }
            window => window,
        }
    }

    /// The region being captured
    pub fn target(&self) -> CaptureTarget {
        match self {
            Self::Display { display_id, .. } => CaptureTarget::Display(*display_id),
            Self::Window { window_id } => CaptureTarget::Window(*window_id),
        }
    }

    /// Kind of the region being captured
    pub fn kind(&self) -> CaptureKind {
        match self {
            Self::Display { .. } => CaptureKind::Display,
            Self::Window { .. } => CaptureKind::Window,
        }
    }

    /// Excluded application ids
    pub fn excluded_apps(&self) -> &[String] {
        match self {
            Self::Display { excluded_apps, .. } => excluded_apps,
            Self::Window { .. } => &[],
        }
    }
}

impl std::fmt::Display for ContentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Display {
                display_id,
                excluded_apps,
            } if !excluded_apps.is_empty() => write!(
                f,
                "Display({}) excluding {} apps",
                display_id,
                excluded_apps.len()
            ),
            other => write!(f, "{}", other.target()),
        }
    }
}

/// Resolution/framerate preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Preset {
    /// 1280x720 @ 30fps
    #[serde(rename = "720p30")]
    P720_30,
    /// 1280x720 @ 60fps
    #[serde(rename = "720p60")]
    P720_60,
    /// 1920x1080 @ 30fps
    #[serde(rename = "1080p30")]
    P1080_30,
    /// 1920x1080 @ 60fps (default)
    #[default]
    #[serde(rename = "1080p60")]
    P1080_60,
    /// 2560x1440 @ 30fps
    #[serde(rename = "1440p30")]
    P1440_30,
    /// 2560x1440 @ 60fps
    #[serde(rename = "1440p60")]
    P1440_60,
    /// 3840x2160 @ 30fps
    #[serde(rename = "4k30")]
    P4K_30,
    /// 3840x2160 @ 60fps
    #[serde(rename = "4k60")]
    P4K_60,
    /// Custom resolution/framerate
    Custom { width: u32, height: u32, fps: u32 },
}

impl Preset {
    /// Get width in pixels
    pub fn width(&self) -> u32 {
        match self {
            Self::P720_30 | Self::P720_60 => 1280,
            Self::P1080_30 | Self::P1080_60 => 1920,
            Self::P1440_30 | Self::P1440_60 => 2560,
            Self::P4K_30 | Self::P4K_60 => 3840,
            Self::Custom { width, .. } => *width,
        }
    }

    /// Get height in pixels
    pub fn height(&self) -> u32 {
        match self {
            Self::P720_30 | Self::P720_60 => 720,
            Self::P1080_30 | Self::P1080_60 => 1080,
            Self::P1440_30 | Self::P1440_60 => 1440,
            Self::P4K_30 | Self::P4K_60 => 2160,
            Self::Custom { height, .. } => *height,
        }
    }

    /// Get framerate
    pub fn fps(&self) -> u32 {
        match self {
            Self::P720_30 | Self::P1080_30 | Self::P1440_30 | Self::P4K_30 => 30,
            Self::P720_60 | Self::P1080_60 | Self::P1440_60 | Self::P4K_60 => 60,
            Self::Custom { fps, .. } => *fps,
        }
    }

    /// Parse from string, returning Option instead of Result
    pub fn from_preset_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// Get resolution as (width, height) tuple
    pub fn resolution(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P720_30 => write!(f, "720p30"),
            Self::P720_60 => write!(f, "720p60"),
            Self::P1080_30 => write!(f, "1080p30"),
            Self::P1080_60 => write!(f, "1080p60"),
            Self::P1440_30 => write!(f, "1440p30"),
            Self::P1440_60 => write!(f, "1440p60"),
            Self::P4K_30 => write!(f, "4K30"),
            Self::P4K_60 => write!(f, "4K60"),
            Self::Custom { width, height, fps } => write!(f, "{}x{}@{}", width, height, fps),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "720p30" => Ok(Self::P720_30),
            "720p60" => Ok(Self::P720_60),
            "1080p30" => Ok(Self::P1080_30),
            "1080p60" => Ok(Self::P1080_60),
            "1440p30" | "2k30" => Ok(Self::P1440_30),
            "1440p60" | "2k60" => Ok(Self::P1440_60),
            "4k30" | "2160p30" => Ok(Self::P4K_30),
            "4k60" | "2160p60" => Ok(Self::P4K_60),
            _ => Err(format!("Unknown preset: {}", s)),
        }
    }
}

/// Complete capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfiguration {
    /// Output width in pixels
    pub target_width: u32,
    /// Output height in pixels
    pub target_height: u32,
    /// Minimum spacing between frames
    pub frame_interval: FrameInterval,
    /// Maximum frames buffered ahead of the consumer
    pub queue_depth: u32,
    /// What to capture
    pub content_filter: ContentFilter,
}

impl CaptureConfiguration {
    /// 1080p60 capture of the given content
    pub fn new(content_filter: ContentFilter) -> Self {
        Self {
            target_width: Preset::P1080_60.width(),
            target_height: Preset::P1080_60.height(),
            frame_interval: FrameInterval::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            content_filter,
        }
    }

    /// Native-resolution capture of a display
    ///
    /// `scale_factor` is the display's backing scale (2 on HiDPI screens).
    pub fn for_display(display: &DisplayInfo, scale_factor: u32) -> Self {
        let scale = scale_factor.max(1);
        Self::new(ContentFilter::display(display.id))
            .with_resolution(
                display.width.saturating_mul(scale),
                display.height.saturating_mul(scale),
            )
    }

    /// Capture of a single window at twice its point size
    pub fn for_window(window: &WindowInfo) -> Self {
        Self::new(ContentFilter::window(window.id)).with_resolution(
            window.frame.width.saturating_mul(WINDOW_SCALE),
            window.frame.height.saturating_mul(WINDOW_SCALE),
        )
    }

    /// Set resolution and framerate from a preset
    pub fn with_preset(self, preset: Preset) -> Self {
        self.with_resolution(preset.width(), preset.height())
            .with_frame_rate(preset.fps())
    }

    /// Set the output resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }

    /// Cap the framerate
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = FrameInterval::from_fps(fps);
        self
    }

    /// Set the minimum frame interval directly
    pub fn with_frame_interval(mut self, interval: FrameInterval) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the frame queue depth
    pub fn with_queue_depth(mut self, depth: u32) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Replace the content filter
    pub fn with_content_filter(mut self, filter: ContentFilter) -> Self {
        self.content_filter = filter;
        self
    }

    /// Hide windows of these applications
    pub fn with_excluded_apps(mut self, apps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.content_filter = self.content_filter.excluding(apps);
        self
    }

    /// Output size
    pub fn target_size(&self) -> FrameSize {
        FrameSize::new(self.target_width, self.target_height)
    }

    /// Framerate cap
    pub fn fps(&self) -> u32 {
        self.frame_interval.fps()
    }

    /// Whether moving from `self` to `next` needs a new platform stream
    ///
    /// Only switching to a different display or window does; size, rate and
    /// exclusions can be changed on a live stream.
    pub fn requires_restart(&self, next: &CaptureConfiguration) -> bool {
        self.content_filter.target() != next.content_filter.target()
    }

    /// Whether stream properties (size, rate) differ
    pub fn properties_differ(&self, next: &CaptureConfiguration) -> bool {
        self.target_width != next.target_width
            || self.target_height != next.target_height
            || self.frame_interval != next.frame_interval
    }

    /// Validate the configuration and return any warnings
    ///
    /// An empty list means the configuration looks good.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let pixels_per_second =
            (self.target_width as u64) * (self.target_height as u64) * (self.fps() as u64);
        if pixels_per_second > 500_000_000 {
            warnings.push(format!(
                "High resolution/framerate ({}x{} @ {}fps) may overload the capture pipeline.",
                self.target_width,
                self.target_height,
                self.fps()
            ));
        }

        if self.queue_depth > 8 {
            warnings.push(format!(
                "Queue depth {} increases latency and compositor memory use.",
                self.queue_depth
            ));
        }

        if self.frame_interval.numerator == 0 {
            warnings.push("Frame interval is uncapped; capture will run at display rate.".to_string());
        }

        warnings
    }

    /// Validate and return an error if configuration is invalid
    ///
    /// Unlike `validate()` which returns warnings, this returns hard errors
    /// for configurations that cannot work.
    pub fn validate_strict(&self) -> Result<(), String> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err("Resolution cannot be zero".to_string());
        }

        if self.target_width > 8192 || self.target_height > 8192 {
            return Err(format!(
                "Resolution {}x{} exceeds maximum supported (8192x8192)",
                self.target_width, self.target_height
            ));
        }

        if self.frame_interval.denominator == 0 {
            return Err("Frame interval denominator cannot be zero".to_string());
        }

        if self.fps() > 240 {
            return Err(format!(
                "Framerate {} exceeds maximum supported (240)",
                self.fps()
            ));
        }

        if self.queue_depth == 0 {
            return Err("Queue depth must be at least 1".to_string());
        }

        Ok(())
    }
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Publish as soon as the session connects
    pub auto_publish: bool,
    /// How long to wait for the transport to connect
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_publish: true,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval_from_fps() {
        let interval = FrameInterval::from_fps(60);
        assert_eq!(interval.numerator, 1);
        assert_eq!(interval.denominator, 60);
        assert_eq!(interval.fps(), 60);
        assert_eq!(interval.as_duration(), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_uncapped_interval() {
        let interval = FrameInterval::from_fps(0);
        assert_eq!(interval.as_duration(), Duration::ZERO);
        assert_eq!(interval.fps(), 0);
    }

    #[test]
    fn test_display_filter_exclusions() {
        let filter = ContentFilter::display(1).excluding(["org.example.argon"]);
        assert_eq!(filter.excluded_apps(), ["org.example.argon".to_string()]);
        assert_eq!(filter.target(), CaptureTarget::Display(1));
    }

    #[test]
    fn test_window_filter_ignores_exclusions() {
        let filter = ContentFilter::window(7).excluding(["x"]);
        assert!(filter.excluded_apps().is_empty());
    }

    #[test]
    fn test_requires_restart_only_on_target_change() {
        let base = CaptureConfiguration::new(ContentFilter::display(1));
        let resized = base.clone().with_resolution(1280, 720).with_excluded_apps(["a"]);
        let other_display = base.clone().with_content_filter(ContentFilter::display(2));
        let window = base.clone().with_content_filter(ContentFilter::window(1));

        assert!(!base.requires_restart(&resized));
        assert!(base.properties_differ(&resized));
        assert!(base.requires_restart(&other_display));
        assert!(base.requires_restart(&window));
    }

    #[test]
    fn test_validate_strict_rejects_zero_queue() {
        let config = CaptureConfiguration::new(ContentFilter::display(1)).with_queue_depth(0);
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn test_capture_kind_parse() {
        assert_eq!("monitor".parse::<CaptureKind>().ok(), Some(CaptureKind::Display));
        assert_eq!("window".parse::<CaptureKind>().ok(), Some(CaptureKind::Window));
        assert!("tab".parse::<CaptureKind>().is_err());
    }
}
