//! Audio output routing
//!
//! The system notifies us through one global property listener when the
//! default output device changes. The listener thread only publishes the new
//! route; the engine side applies it to its output unit.

pub mod graph;
pub mod route;

pub use graph::{PipeWireAudio, PipeWireOutput};
pub use route::{NotificationOutcome, RouteCell, RouteFollower, RouteMonitor};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Platform audio device id
pub type AudioDeviceId = u32;

/// An audio device known to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: AudioDeviceId,
    /// Persistent unique id
    pub uid: String,
    pub name: String,
    pub has_output_streams: bool,
    pub is_built_in: bool,
}

impl AudioDevice {
    pub fn route(&self) -> AudioOutputRoute {
        AudioOutputRoute {
            device_id: self.id,
            device_uid: self.uid.clone(),
        }
    }
}

/// Where the engine should send audio
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioOutputRoute {
    pub device_id: AudioDeviceId,
    pub device_uid: String,
}

impl fmt::Display for AudioOutputRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_id, self.device_uid)
    }
}

/// Which property changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySelector {
    DefaultOutputDevice,
    DefaultInputDevice,
    Devices,
    /// A selector we have no handling for
    Other(u32),
}

/// Property scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyScope {
    #[default]
    Global,
    Input,
    Output,
}

/// Address of a system audio property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    pub selector: PropertySelector,
    pub scope: PropertyScope,
    /// Element index; 0 is the main element
    pub element: u32,
}

impl PropertyAddress {
    pub const fn new(selector: PropertySelector) -> Self {
        Self {
            selector,
            scope: PropertyScope::Global,
            element: 0,
        }
    }

    /// Global address of the default output device property
    pub const fn default_output_device() -> Self {
        Self::new(PropertySelector::DefaultOutputDevice)
    }
}

/// Registration returned by [`AudioPlatform::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked on a platform thread with every changed address
pub type PropertyListener = Arc<dyn Fn(&[PropertyAddress]) + Send + Sync>;

/// System audio hardware
pub trait AudioPlatform: Send + Sync {
    /// The current default output device
    fn default_output_device(&self) -> Result<AudioDevice>;

    /// All audio devices
    fn devices(&self) -> Result<Vec<AudioDevice>>;

    /// Register a listener on the system object
    fn add_listener(&self, address: PropertyAddress, listener: PropertyListener)
        -> Result<ListenerId>;

    /// Remove a listener registered with `add_listener`
    fn remove_listener(&self, id: ListenerId) -> Result<()>;
}

/// The audio engine's output unit
pub trait OutputUnit: Send + Sync {
    /// Point the unit at another device without tearing down the engine
    fn set_current_device(&self, device_id: AudioDeviceId) -> Result<()>;
}

/// Devices that can play audio
pub fn output_devices(platform: &dyn AudioPlatform) -> Result<Vec<AudioDevice>> {
    Ok(platform
        .devices()?
        .into_iter()
        .filter(|d| d.has_output_streams)
        .collect())
}

/// First built-in device with output streams
pub fn built_in_output(platform: &dyn AudioPlatform) -> Result<Option<AudioDevice>> {
    Ok(output_devices(platform)?.into_iter().find(|d| d.is_built_in))
}
