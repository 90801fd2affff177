//! Integration tests for configuration system

use argon_core::capture::{DisplayInfo, RunningApplication, WindowInfo};
use argon_core::config::{
    sample_config, CaptureConfiguration, CaptureKind, CaptureSettings, ConfigFile, ContentFilter,
    Preset,
};
use argon_core::types::FrameSize;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_preset_resolution() {
    assert_eq!(Preset::P720_30.resolution(), (1280, 720));
    assert_eq!(Preset::P1080_60.resolution(), (1920, 1080));
    assert_eq!(Preset::P1440_60.resolution(), (2560, 1440));
    assert_eq!(Preset::P4K_60.resolution(), (3840, 2160));
}

#[test]
fn test_preset_from_string() {
    assert_eq!(Preset::from_preset_str("720p30"), Some(Preset::P720_30));
    assert_eq!(Preset::from_preset_str("1080P60"), Some(Preset::P1080_60));
    assert_eq!(Preset::from_preset_str("2k60"), Some(Preset::P1440_60));
    assert_eq!(Preset::from_preset_str("2160p30"), Some(Preset::P4K_30));
    assert_eq!(Preset::from_preset_str("invalid"), None);
}

#[test]
fn test_display_configuration_uses_backing_scale() {
    let display = DisplayInfo {
        id: 4,
        width: 1512,
        height: 982,
    };
    let config = CaptureConfiguration::for_display(&display, 2);

    assert_eq!(config.target_size(), FrameSize::new(3024, 1964));
    assert_eq!(config.fps(), 60);
    assert_eq!(config.queue_depth, 5);
    assert_eq!(config.content_filter, ContentFilter::display(4));
}

#[test]
fn test_huge_scale_factor_is_rejected_not_overflowed() {
    let display = DisplayInfo {
        id: 1,
        width: 2560,
        height: 1440,
    };
    let config = CaptureConfiguration::for_display(&display, u32::MAX);

    assert_eq!(config.target_size(), FrameSize::new(u32::MAX, u32::MAX));
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_window_configuration_doubles_point_size() {
    let window = WindowInfo {
        id: 9,
        title: Some("Terminal".to_string()),
        frame: FrameSize::new(640, 400),
        owning_application: Some(RunningApplication {
            app_id: "org.term".to_string(),
            name: "Term".to_string(),
            pid: 3,
        }),
        on_screen: true,
    };
    let config = CaptureConfiguration::for_window(&window);

    assert_eq!(config.target_size(), FrameSize::new(1280, 800));
    assert_eq!(config.content_filter.kind(), CaptureKind::Window);
}

#[test]
fn test_restart_needed_only_for_new_target() {
    let base = CaptureConfiguration::new(ContentFilter::display(1));

    assert!(!base.requires_restart(&base.clone().with_resolution(1280, 720)));
    assert!(!base.requires_restart(&base.clone().with_frame_rate(30)));
    assert!(!base.requires_restart(&base.clone().with_excluded_apps(["org.argon"])));
    assert!(base.requires_restart(&base.clone().with_content_filter(ContentFilter::display(2))));
    assert!(base.requires_restart(&base.clone().with_content_filter(ContentFilter::window(1))));
}

#[test]
fn test_validate_strict() {
    let ok = CaptureConfiguration::new(ContentFilter::display(1));
    assert!(ok.validate_strict().is_ok());

    assert!(ok.clone().with_resolution(0, 1080).validate_strict().is_err());
    assert!(ok.clone().with_resolution(10000, 1080).validate_strict().is_err());
    assert!(ok.clone().with_frame_rate(500).validate_strict().is_err());
    assert!(ok.clone().with_queue_depth(0).validate_strict().is_err());
}

#[test]
fn test_validate_warnings() {
    let config = CaptureConfiguration::new(ContentFilter::display(1))
        .with_preset(Preset::P4K_60)
        .with_queue_depth(12);
    let warnings = config.validate();

    assert!(warnings.iter().any(|w| w.contains("Queue depth 12")));

    let uncapped = CaptureConfiguration::new(ContentFilter::display(1)).with_frame_rate(0);
    assert!(uncapped.validate().iter().any(|w| w.contains("uncapped")));
}

#[test]
fn test_config_file_save_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("argon").join("config.toml");

    let mut config = ConfigFile::default();
    config.capture.kind = "window".to_string();
    config.capture.preset = "720p60".to_string();
    config.capture.queue_depth = 3;
    config.session.connect_timeout_secs = 5;
    config.audio.follow_default_output = false;

    config.save_to(path.clone()).unwrap();
    let loaded = ConfigFile::load_from(path).unwrap();

    assert_eq!(loaded.capture.capture_kind().unwrap(), CaptureKind::Window);
    assert_eq!(loaded.capture.preset().unwrap(), Some(Preset::P720_60));
    assert_eq!(loaded.capture.queue_depth, 3);
    assert_eq!(
        loaded.session.to_session_config().connect_timeout,
        Duration::from_secs(5)
    );
    assert!(!loaded.audio.follow_default_output);
}

#[test]
fn test_missing_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let loaded = ConfigFile::load_from(temp_dir.path().join("nope.toml")).unwrap();

    assert_eq!(loaded.capture.kind, "display");
    assert!(loaded.session.auto_publish);
}

#[test]
fn test_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[capture]\nfps = 30\n").unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    assert_eq!(loaded.capture.fps, 30);
    assert_eq!(loaded.capture.queue_depth, 5);
    assert!(loaded.capture.exclude_self);
    assert_eq!(loaded.session.connect_timeout_secs, 30);
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[capture\nfps = ").unwrap();

    let err = ConfigFile::load_from(path).err().unwrap();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_sample_config_matches_defaults() {
    let sample: ConfigFile = toml::from_str(&sample_config()).unwrap();
    let defaults = ConfigFile::default();

    assert_eq!(sample.capture.kind, defaults.capture.kind);
    assert_eq!(sample.capture.fps, defaults.capture.fps);
    assert_eq!(sample.capture.queue_depth, defaults.capture.queue_depth);
    assert_eq!(sample.capture.refresh_secs, defaults.capture.refresh_secs);
    assert_eq!(
        sample.session.connect_timeout_secs,
        defaults.session.connect_timeout_secs
    );
}

#[test]
fn test_settings_apply_fps_without_preset() {
    let settings = CaptureSettings {
        fps: 24,
        ..CaptureSettings::default()
    };
    let config = settings
        .apply_to(CaptureConfiguration::new(ContentFilter::display(1)).with_resolution(800, 600))
        .unwrap();

    assert_eq!(config.target_size(), FrameSize::new(800, 600));
    assert_eq!(config.fps(), 24);
}

#[test]
fn test_unknown_kind_is_rejected() {
    let settings = CaptureSettings {
        kind: "region".to_string(),
        ..CaptureSettings::default()
    };
    assert!(settings.capture_kind().is_err());
}
