//! Default output device tracking

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    AudioOutputRoute, AudioPlatform, ListenerId, OutputUnit, PropertyAddress, PropertyListener,
    PropertySelector,
};
use crate::error::Result;

/// Lock-free handoff of the current output route
///
/// Written from the platform listener thread, read by one engine-side
/// [`RouteFollower`].
#[derive(Default)]
pub struct RouteCell {
    route: ArcSwapOption<AudioOutputRoute>,
    generation: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl RouteCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new route and wake the follower
    pub fn publish(&self, route: AudioOutputRoute) {
        self.route.store(Some(Arc::new(route)));
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.notify.notify_one();
    }

    pub fn current(&self) -> Option<Arc<AudioOutputRoute>> {
        self.route.load_full()
    }

    /// Incremented by every publish
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// What a batch of property notifications did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationOutcome {
    /// Last route published by this batch
    pub published: Option<AudioOutputRoute>,
    /// Addresses with selectors we do not handle
    pub ignored: usize,
    /// Default device changes whose new device could not be resolved
    pub failed: usize,
}

/// Watches the system default output device
///
/// Installs one global listener on construction and removes it on drop.
pub struct RouteMonitor {
    platform: Arc<dyn AudioPlatform>,
    cell: Arc<RouteCell>,
    listener: Option<ListenerId>,
}

impl RouteMonitor {
    /// Register the listener and publish the current default device
    pub fn install(platform: Arc<dyn AudioPlatform>) -> Result<Self> {
        let cell = Arc::new(RouteCell::new());

        match platform.default_output_device() {
            Ok(device) => {
                info!("Default audio output: {} ({})", device.name, device.uid);
                cell.publish(device.route());
            }
            Err(e) => warn!("Could not resolve default audio output: {}", e),
        }

        let weak_platform: Weak<dyn AudioPlatform> = Arc::downgrade(&platform);
        let listener_cell = cell.clone();
        let listener: PropertyListener = Arc::new(move |addresses: &[PropertyAddress]| {
            let Some(platform) = weak_platform.upgrade() else {
                return;
            };
            handle_notification(platform.as_ref(), &listener_cell, addresses);
        });

        let id = platform.add_listener(PropertyAddress::default_output_device(), listener)?;
        debug!("Installed default output listener {:?}", id);

        Ok(Self {
            platform,
            cell,
            listener: Some(id),
        })
    }

    /// Process a notification batch as the platform listener would
    pub fn on_notification(&self, addresses: &[PropertyAddress]) -> NotificationOutcome {
        handle_notification(self.platform.as_ref(), &self.cell, addresses)
    }

    pub fn current_route(&self) -> Option<Arc<AudioOutputRoute>> {
        self.cell.current()
    }

    pub fn route_cell(&self) -> Arc<RouteCell> {
        self.cell.clone()
    }

    /// Engine-side applier for this monitor's routes
    pub fn follower(&self, unit: Arc<dyn OutputUnit>) -> RouteFollower {
        RouteFollower::new(self.cell.clone(), unit)
    }

    pub fn platform(&self) -> &Arc<dyn AudioPlatform> {
        &self.platform
    }
}

impl Drop for RouteMonitor {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            if let Err(e) = self.platform.remove_listener(id) {
                warn!("Failed to remove default output listener: {}", e);
            } else {
                debug!("Removed default output listener {:?}", id);
            }
        }
        self.cell.close();
    }
}

fn handle_notification(
    platform: &dyn AudioPlatform,
    cell: &RouteCell,
    addresses: &[PropertyAddress],
) -> NotificationOutcome {
    let mut outcome = NotificationOutcome::default();

    for address in addresses {
        match address.selector {
            PropertySelector::DefaultOutputDevice => match platform.default_output_device() {
                Ok(device) => {
                    info!("Default output device changed: {}: {}", device.id, device.uid);
                    let route = device.route();
                    cell.publish(route.clone());
                    outcome.published = Some(route);
                }
                Err(e) => {
                    error!("Failed to resolve new default output device: {}", e);
                    outcome.failed += 1;
                }
            },
            other => {
                warn!("Unexpected audio property notification: {:?}", other);
                outcome.ignored += 1;
            }
        }
    }
    outcome
}

/// Applies published routes to an output unit
pub struct RouteFollower {
    cell: Arc<RouteCell>,
    unit: Arc<dyn OutputUnit>,
    applied: u64,
}

impl RouteFollower {
    pub fn new(cell: Arc<RouteCell>, unit: Arc<dyn OutputUnit>) -> Self {
        Self {
            cell,
            unit,
            applied: 0,
        }
    }

    /// Apply the latest route if it has not been applied yet
    pub fn poll(&mut self) -> Result<Option<AudioOutputRoute>> {
        let generation = self.cell.generation();
        if generation == self.applied {
            return Ok(None);
        }
        let Some(route) = self.cell.current() else {
            self.applied = generation;
            return Ok(None);
        };

        self.unit.set_current_device(route.device_id)?;
        self.applied = generation;
        info!("Audio output retargeted to {}", route);
        Ok(Some(route.as_ref().clone()))
    }

    /// Apply routes as they are published until the monitor is dropped
    pub async fn follow(mut self) {
        loop {
            if let Err(e) = self.poll() {
                error!("Failed to set output device: {}", e);
            }
            if self.cell.is_closed() {
                break;
            }
            self.cell.notify.notified().await;
        }
        debug!("Route follower stopped");
    }

    /// Run on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.follow())
    }
}
