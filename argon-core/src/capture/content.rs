//! Shareable content: displays, windows and the applications owning them

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::capture::CapturePlatform;
use crate::config::{CaptureConfiguration, CaptureKind, ContentFilter};
use crate::error::Result;
use crate::types::FrameSize;

/// A running application that owns capturable windows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunningApplication {
    /// Stable application id (desktop file id or bundle identifier)
    pub app_id: String,
    /// Human-readable name
    pub name: String,
    /// Process id
    pub pid: u32,
}

/// A capturable display
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    /// Width in points
    pub width: u32,
    /// Height in points
    pub height: u32,
}

impl DisplayInfo {
    pub fn display_name(&self) -> String {
        format!("Display: {} x {}", self.width, self.height)
    }
}

/// A capturable window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: u32,
    pub title: Option<String>,
    /// Window frame size in points
    pub frame: FrameSize,
    pub owning_application: Option<RunningApplication>,
    pub on_screen: bool,
}

impl WindowInfo {
    /// Name shown in pickers: "App: Title", "Title", "App: id" or empty
    pub fn display_name(&self) -> String {
        match (&self.owning_application, &self.title) {
            (Some(app), Some(title)) => format!("{}: {}", app.name, title),
            (None, Some(title)) => title.clone(),
            (Some(app), None) => format!("{}: {}", app.name, self.id),
            (None, None) => String::new(),
        }
    }

    fn app_name(&self) -> &str {
        self.owning_application
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("")
    }
}

/// Everything the platform currently allows us to capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareableContent {
    pub displays: Vec<DisplayInfo>,
    pub windows: Vec<WindowInfo>,
    pub applications: Vec<RunningApplication>,
}

/// Windows worth offering for capture
///
/// Sorted by application name; windows without an owning application (or
/// with an unnamed one) and our own windows are removed.
pub fn filter_windows(windows: &[WindowInfo], own_app_id: Option<&str>) -> Vec<WindowInfo> {
    let mut windows: Vec<WindowInfo> = windows
        .iter()
        .filter(|w| {
            w.owning_application
                .as_ref()
                .is_some_and(|app| !app.name.is_empty())
        })
        .filter(|w| match (own_app_id, &w.owning_application) {
            (Some(own), Some(app)) => app.app_id != own,
            _ => true,
        })
        .cloned()
        .collect();
    windows.sort_by(|a, b| a.app_name().cmp(b.app_name()));
    windows
}

#[derive(Debug, Default)]
struct CatalogState {
    content: ShareableContent,
    windows: Vec<WindowInfo>,
    selected_display: Option<DisplayInfo>,
    selected_window: Option<WindowInfo>,
}

/// Cached, periodically refreshed view of the shareable content
///
/// Keeps a display and a window selected: the first of each is picked as
/// soon as content is known, and user picks survive refreshes.
pub struct ContentCatalog {
    own_app_id: Option<String>,
    state: RwLock<CatalogState>,
}

impl ContentCatalog {
    /// Create an empty catalog; `own_app_id` is filtered from window lists
    pub fn new(own_app_id: Option<String>) -> Self {
        Self {
            own_app_id,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Query the platform and update the cached lists
    pub async fn refresh(&self, platform: &dyn CapturePlatform) -> Result<()> {
        let content = platform.shareable_content().await?;
        let windows = filter_windows(&content.windows, self.own_app_id.as_deref());

        let mut state = self.state.write();
        if state.selected_display.is_none() {
            state.selected_display = content.displays.first().cloned();
        }
        if state.selected_window.is_none() {
            state.selected_window = windows.first().cloned();
        }
        if state.windows != windows {
            trace!("Window list changed: {} windows", windows.len());
            state.windows = windows;
        }
        state.content = content;
        Ok(())
    }

    /// Refresh every `interval` until the returned task is aborted
    pub fn spawn_refresh(
        self: &Arc<Self>,
        platform: Arc<dyn CapturePlatform>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = catalog.refresh(platform.as_ref()).await {
                    error!("Failed to get the shareable content: {}", e);
                }
            }
        })
    }

    pub fn displays(&self) -> Vec<DisplayInfo> {
        self.state.read().content.displays.clone()
    }

    /// Filtered, sorted window list
    pub fn windows(&self) -> Vec<WindowInfo> {
        self.state.read().windows.clone()
    }

    pub fn applications(&self) -> Vec<RunningApplication> {
        self.state.read().content.applications.clone()
    }

    pub fn selected_display(&self) -> Option<DisplayInfo> {
        self.state.read().selected_display.clone()
    }

    pub fn selected_window(&self) -> Option<WindowInfo> {
        self.state.read().selected_window.clone()
    }

    /// Select a display by id; returns false if it is unknown
    pub fn select_display(&self, id: u32) -> bool {
        let mut state = self.state.write();
        let found = state.content.displays.iter().find(|d| d.id == id).cloned();
        if found.is_some() {
            state.selected_display = found;
        }
        state.selected_display.as_ref().is_some_and(|d| d.id == id)
    }

    /// Select a window by id; returns false if it is unknown
    pub fn select_window(&self, id: u32) -> bool {
        let mut state = self.state.write();
        let found = state.windows.iter().find(|w| w.id == id).cloned();
        if found.is_some() {
            state.selected_window = found;
        }
        state.selected_window.as_ref().is_some_and(|w| w.id == id)
    }

    /// Applications to hide when sharing a display with self-exclusion on
    pub fn self_exclusions(&self) -> Vec<String> {
        let Some(own) = self.own_app_id.as_deref() else {
            return Vec::new();
        };
        self.state
            .read()
            .content
            .applications
            .iter()
            .filter(|app| app.app_id == own)
            .map(|app| app.app_id.clone())
            .collect()
    }

    /// Build a capture configuration for the current selection
    ///
    /// Returns `None` until content of the requested kind is known.
    pub fn configuration(
        &self,
        kind: CaptureKind,
        scale_factor: u32,
        exclude_self: bool,
    ) -> Option<CaptureConfiguration> {
        match kind {
            CaptureKind::Display => {
                let selected = self.selected_display()?;
                let mut config = CaptureConfiguration::for_display(&selected, scale_factor);
                if exclude_self {
                    config = config.with_excluded_apps(self.self_exclusions());
                }
                debug!("Capture configuration for {}", selected.display_name());
                Some(config)
            }
            CaptureKind::Window => {
                let window = self.selected_window()?;
                debug!("Capture configuration for window '{}'", window.display_name());
                Some(CaptureConfiguration::for_window(&window))
            }
        }
    }

    /// Content filter for the current selection
    pub fn content_filter(&self, kind: CaptureKind, exclude_self: bool) -> Option<ContentFilter> {
        self.configuration(kind, 1, exclude_self)
            .map(|config| config.content_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, name: &str) -> RunningApplication {
        RunningApplication {
            app_id: id.to_string(),
            name: name.to_string(),
            pid: 1,
        }
    }

    fn window(id: u32, title: Option<&str>, owner: Option<RunningApplication>) -> WindowInfo {
        WindowInfo {
            id,
            title: title.map(str::to_string),
            frame: FrameSize::new(800, 600),
            owning_application: owner,
            on_screen: true,
        }
    }

    #[test]
    fn test_window_display_names() {
        let term = app("org.term", "Terminal");
        assert_eq!(
            window(1, Some("bash"), Some(term.clone())).display_name(),
            "Terminal: bash"
        );
        assert_eq!(window(2, Some("bash"), None).display_name(), "bash");
        assert_eq!(window(3, None, Some(term)).display_name(), "Terminal: 3");
        assert_eq!(window(4, None, None).display_name(), "");
    }

    #[test]
    fn test_display_name() {
        let display = DisplayInfo {
            id: 1,
            width: 2560,
            height: 1440,
        };
        assert_eq!(display.display_name(), "Display: 2560 x 1440");
    }

    #[test]
    fn test_filter_windows_sorts_and_removes() {
        let windows = vec![
            window(1, Some("z"), Some(app("org.zed", "Zed"))),
            window(2, Some("orphan"), None),
            window(3, Some("a"), Some(app("org.alacritty", "Alacritty"))),
            window(4, Some("self"), Some(app("org.argon", "Argon"))),
            window(5, Some("unnamed"), Some(app("org.x", ""))),
        ];

        let filtered = filter_windows(&windows, Some("org.argon"));
        let ids: Vec<u32> = filtered.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_window_configuration_doubles_frame() {
        let catalog = ContentCatalog::new(None);
        {
            let mut state = catalog.state.write();
            let w = window(9, Some("doc"), Some(app("org.doc", "Doc")));
            state.windows = vec![w.clone()];
            state.selected_window = Some(w);
        }
        let config = catalog.configuration(CaptureKind::Window, 1, false).unwrap();
        assert_eq!(config.target_size(), FrameSize::new(1600, 1200));
        assert_eq!(config.content_filter, ContentFilter::window(9));
    }

    #[test]
    fn test_display_configuration_hides_own_app() {
        let catalog = ContentCatalog::new(Some("org.argon".to_string()));
        {
            let mut state = catalog.state.write();
            let display = DisplayInfo {
                id: 3,
                width: 1920,
                height: 1080,
            };
            state.content.displays = vec![display.clone()];
            state.content.applications = vec![app("org.argon", "Argon"), app("org.zed", "Zed")];
            state.selected_display = Some(display);
        }

        let config = catalog.configuration(CaptureKind::Display, 2, true).unwrap();
        assert_eq!(config.target_size(), FrameSize::new(3840, 2160));
        assert_eq!(
            config.content_filter,
            ContentFilter::display(3).excluding(vec!["org.argon".to_string()])
        );

        let shown = catalog.content_filter(CaptureKind::Display, false).unwrap();
        assert_eq!(shown, ContentFilter::display(3));
    }

    #[test]
    fn test_configuration_none_without_content() {
        let catalog = ContentCatalog::new(None);
        assert!(catalog.configuration(CaptureKind::Display, 2, true).is_none());
    }
}
