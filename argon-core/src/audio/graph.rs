//! PipeWire audio graph backend
//!
//! A dedicated thread follows the registry for audio device nodes and the
//! `default` metadata object. A change of `default.audio.sink` reaches
//! listeners as a default output device change, devices coming and going as
//! a device list change. Listeners run on the PipeWire thread.
//!
//! Playback is retargeted by writing `target.object` for the named playback
//! stream, so the session manager moves the stream without reopening it.

use parking_lot::Mutex;
use pipewire as pw;
use pw::metadata::{Metadata, MetadataListener};
use pw::spa::utils::dict::DictRef;
use pw::types::ObjectType;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::{
    AudioDevice, AudioDeviceId, AudioPlatform, ListenerId, OutputUnit, PropertyAddress,
    PropertyListener, PropertySelector,
};
use crate::error::{ArgonError, Result};

const DEFAULT_METADATA: &str = "default";
const DEFAULT_SINK_KEY: &str = "default.audio.sink";
const DEFAULT_SOURCE_KEY: &str = "default.audio.source";
const TARGET_OBJECT_KEY: &str = "target.object";

/// Node name prefixes of devices on the machine's own sound hardware
const BUILT_IN_PREFIXES: &[&str] = &[
    "alsa_output.pci-",
    "alsa_input.pci-",
    "alsa_output.platform-",
    "alsa_input.platform-",
];

/// Messages from the engine side into the PipeWire loop
enum Control {
    Retarget {
        stream: String,
        device: AudioDeviceId,
    },
    Shutdown,
}

/// Value of the `default.audio.*` metadata keys
#[derive(Debug, Deserialize)]
struct DefaultNode {
    name: String,
}

/// Parse `{"name": "<node.name>"}`
fn parse_default_node(value: &str) -> Option<String> {
    serde_json::from_str::<DefaultNode>(value)
        .ok()
        .map(|node| node.name)
}

fn is_built_in(node_name: &str) -> bool {
    BUILT_IN_PREFIXES
        .iter()
        .any(|prefix| node_name.starts_with(prefix))
}

/// The node properties we care about
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeProps {
    media_class: String,
    name: String,
    description: Option<String>,
}

impl NodeProps {
    fn from_dict(props: &DictRef) -> Option<Self> {
        Some(Self {
            media_class: props.get("media.class")?.to_string(),
            name: props.get("node.name")?.to_string(),
            description: props
                .get("node.description")
                .or_else(|| props.get("node.nick"))
                .map(str::to_string),
        })
    }

    fn device(&self, id: u32) -> AudioDevice {
        AudioDevice {
            id,
            uid: self.name.clone(),
            name: self.description.clone().unwrap_or_else(|| self.name.clone()),
            has_output_streams: matches!(self.media_class.as_str(), "Audio/Sink" | "Audio/Duplex"),
            is_built_in: is_built_in(&self.name),
        }
    }
}

/// Audio nodes and defaults as last reported by PipeWire
#[derive(Debug, Default)]
struct AudioGraph {
    devices: BTreeMap<u32, AudioDevice>,
    /// Playback streams by node id
    streams: BTreeMap<u32, String>,
    default_sink: Option<String>,
    default_source: Option<String>,
    /// Device the named stream should play on
    target: Option<(String, AudioDeviceId)>,
}

impl AudioGraph {
    /// Record a node; returns the properties that changed
    fn add_node(&mut self, id: u32, props: &NodeProps) -> Vec<PropertySelector> {
        match props.media_class.as_str() {
            "Audio/Sink" | "Audio/Source" | "Audio/Duplex" => {
                self.devices.insert(id, props.device(id));
                let mut changed = vec![PropertySelector::Devices];
                // The default may have been announced before its node
                if self.default_sink.as_deref() == Some(props.name.as_str()) {
                    changed.push(PropertySelector::DefaultOutputDevice);
                }
                changed
            }
            "Stream/Output/Audio" => {
                self.streams.insert(id, props.name.clone());
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn remove(&mut self, id: u32) -> Vec<PropertySelector> {
        self.streams.remove(&id);
        match self.devices.remove(&id) {
            Some(_) => vec![PropertySelector::Devices],
            None => Vec::new(),
        }
    }

    /// Apply a `default` metadata property on the core object
    ///
    /// A `None` key clears every property.
    fn set_default(&mut self, key: Option<&str>, value: Option<&str>) -> Vec<PropertySelector> {
        let name = value.and_then(parse_default_node);
        let mut changed = Vec::new();
        if matches!(key, None | Some(DEFAULT_SINK_KEY)) && self.default_sink != name {
            self.default_sink = name.clone();
            changed.push(PropertySelector::DefaultOutputDevice);
        }
        if matches!(key, None | Some(DEFAULT_SOURCE_KEY)) && self.default_source != name {
            self.default_source = name;
            changed.push(PropertySelector::DefaultInputDevice);
        }
        changed
    }

    fn default_output(&self) -> Option<&AudioDevice> {
        let name = self.default_sink.as_deref()?;
        self.devices.values().find(|d| d.uid == name)
    }

    /// Stream node and device name to write for the current target
    fn target_object(&self) -> Option<(u32, String)> {
        let (stream, device) = self.target.as_ref()?;
        let stream_id = self
            .streams
            .iter()
            .find(|(_, name)| *name == stream)
            .map(|(id, _)| *id)?;
        let device = self.devices.get(device)?;
        Some((stream_id, device.uid.clone()))
    }
}

/// State shared between the PipeWire thread and callers
#[derive(Default)]
struct Shared {
    graph: Mutex<AudioGraph>,
    listeners: Mutex<HashMap<u64, (PropertyAddress, PropertyListener)>>,
    next_listener: AtomicU64,
}

impl Shared {
    /// Invoke each listener with the changed addresses it registered for
    fn notify(&self, changed: &[PropertySelector]) {
        if changed.is_empty() {
            return;
        }
        let listeners: Vec<(PropertyAddress, PropertyListener)> =
            self.listeners.lock().values().cloned().collect();
        for (address, listener) in listeners {
            let matching: Vec<PropertyAddress> = changed
                .iter()
                .filter(|selector| **selector == address.selector)
                .map(|_| address)
                .collect();
            if !matching.is_empty() {
                listener(&matching);
            }
        }
    }
}

/// The `default` metadata object and its listener
struct BoundMetadata {
    id: u32,
    metadata: Metadata,
    _listener: MetadataListener,
}

/// System audio as seen through the PipeWire graph
pub struct PipeWireAudio {
    shared: Arc<Shared>,
    control: Mutex<Option<pw::channel::Sender<Control>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PipeWireAudio {
    /// Connect to PipeWire and wait until the initial graph is known
    ///
    /// Blocks for up to `timeout`.
    pub fn connect(timeout: Duration) -> Result<Arc<Self>> {
        let shared = Arc::new(Shared::default());
        let (control_tx, control_rx) = pw::channel::channel::<Control>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("argon-audio".to_string())
            .spawn(move || {
                if let Err(e) = run_audio_loop(thread_shared, control_rx, ready_tx.clone()) {
                    error!("Audio graph loop error: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| ArgonError::pipewire(format!("Failed to spawn audio thread: {}", e)))?;

        let audio = Arc::new(Self {
            shared,
            control: Mutex::new(Some(control_tx)),
            thread: Mutex::new(Some(thread)),
        });

        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                let graph = audio.shared.graph.lock();
                info!(
                    "PipeWire audio graph ready: {} devices, default sink {:?}",
                    graph.devices.len(),
                    graph.default_sink
                );
                drop(graph);
                Ok(audio)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ArgonError::pipewire(format!(
                "PipeWire audio graph not ready after {:?}",
                timeout
            ))),
        }
    }

    /// Output unit moving the playback stream named `stream`
    pub fn output_unit(&self, stream: impl Into<String>) -> Result<PipeWireOutput> {
        let control = self
            .control
            .lock()
            .clone()
            .ok_or_else(|| ArgonError::invalid_state("audio graph stopped"))?;
        Ok(PipeWireOutput {
            stream: stream.into(),
            control,
        })
    }

    fn shutdown(&self) {
        if let Some(control) = self.control.lock().take() {
            let _ = control.send(Control::Shutdown);
        }
        if let Some(thread) = self.thread.lock().take() {
            // The last reference may go away inside a listener on the loop itself
            if thread.thread().id() == std::thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                warn!("Audio graph thread panicked");
            }
        }
    }
}

impl AudioPlatform for PipeWireAudio {
    fn default_output_device(&self) -> Result<AudioDevice> {
        let graph = self.shared.graph.lock();
        graph.default_output().cloned().ok_or_else(|| match &graph.default_sink {
            Some(name) => ArgonError::audio(format!("default sink '{}' is not in the graph", name)),
            None => ArgonError::audio("PipeWire reports no default sink"),
        })
    }

    fn devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(self.shared.graph.lock().devices.values().cloned().collect())
    }

    fn add_listener(
        &self,
        address: PropertyAddress,
        listener: PropertyListener,
    ) -> Result<ListenerId> {
        let id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        self.shared.listeners.lock().insert(id, (address, listener));
        Ok(ListenerId(id))
    }

    fn remove_listener(&self, id: ListenerId) -> Result<()> {
        self.shared
            .listeners
            .lock()
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| ArgonError::audio(format!("no listener {}", id.0)))
    }
}

impl Drop for PipeWireAudio {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Moves one named playback stream between output devices
pub struct PipeWireOutput {
    stream: String,
    control: pw::channel::Sender<Control>,
}

impl PipeWireOutput {
    pub fn stream(&self) -> &str {
        &self.stream
    }
}

impl OutputUnit for PipeWireOutput {
    fn set_current_device(&self, device_id: AudioDeviceId) -> Result<()> {
        self.control
            .send(Control::Retarget {
                stream: self.stream.clone(),
                device: device_id,
            })
            .map_err(|_| ArgonError::audio("PipeWire audio loop is not running"))
    }
}

/// Write the current target of the graph, if both ends are known
fn apply_target(shared: &Shared, metadata: &RefCell<Option<BoundMetadata>>) {
    let Some((stream_id, device)) = shared.graph.lock().target_object() else {
        trace!("Playback target not resolvable yet");
        return;
    };
    match metadata.borrow().as_ref() {
        Some(bound) => {
            info!("Moving playback stream {} to {}", stream_id, device);
            bound
                .metadata
                .set_property(stream_id, TARGET_OBJECT_KEY, None, Some(device.as_str()));
        }
        None => warn!("No default metadata, cannot move playback stream {}", stream_id),
    }
}

/// Run the PipeWire main loop (called from the dedicated thread)
fn run_audio_loop(
    shared: Arc<Shared>,
    control_rx: pw::channel::Receiver<Control>,
    ready: mpsc::Sender<Result<()>>,
) -> Result<()> {
    pw::init();

    info!("Connecting to the PipeWire audio graph");

    let mainloop = pw::main_loop::MainLoop::new(None)
        .map_err(|e| ArgonError::pipewire(format!("Failed to create audio main loop: {}", e)))?;

    let context = pw::context::Context::new(&mainloop)
        .map_err(|e| ArgonError::pipewire(format!("Failed to create audio context: {}", e)))?;

    let core = context
        .connect(None)
        .map_err(|e| ArgonError::pipewire(format!("Failed to connect to PipeWire: {}", e)))?;

    let registry = Rc::new(
        core.get_registry()
            .map_err(|e| ArgonError::pipewire(format!("Failed to get registry: {}", e)))?,
    );
    let metadata: Rc<RefCell<Option<BoundMetadata>>> = Rc::new(RefCell::new(None));

    let registry_weak = Rc::downgrade(&registry);
    let global_shared = shared.clone();
    let global_metadata = metadata.clone();
    let remove_shared = shared.clone();
    let remove_metadata = metadata.clone();

    let _registry_listener = registry
        .add_listener_local()
        .global(move |global| match global.type_ {
            ObjectType::Node => {
                let Some(props) = global.props.and_then(NodeProps::from_dict) else {
                    return;
                };
                trace!("Node {} ({}): {}", global.id, props.media_class, props.name);
                let changed = global_shared.graph.lock().add_node(global.id, &props);
                global_shared.notify(&changed);
                if props.media_class == "Stream/Output/Audio" {
                    apply_target(&global_shared, &global_metadata);
                }
            }
            ObjectType::Metadata => {
                let name = global.props.and_then(|props| props.get("metadata.name"));
                if name != Some(DEFAULT_METADATA) || global_metadata.borrow().is_some() {
                    return;
                }
                let Some(registry) = registry_weak.upgrade() else {
                    return;
                };
                let bound: Metadata = match registry.bind(global) {
                    Ok(bound) => bound,
                    Err(e) => {
                        warn!("Failed to bind default metadata: {}", e);
                        return;
                    }
                };
                let property_shared = global_shared.clone();
                let listener = bound
                    .add_listener_local()
                    .property(move |subject, key, _type, value| {
                        if subject == pw::core::PW_ID_CORE {
                            let changed = property_shared.graph.lock().set_default(key, value);
                            if !changed.is_empty() {
                                debug!("Default audio devices changed: {:?}", changed);
                            }
                            property_shared.notify(&changed);
                        }
                        0
                    })
                    .register();
                debug!("Bound default metadata {}", global.id);
                *global_metadata.borrow_mut() = Some(BoundMetadata {
                    id: global.id,
                    metadata: bound,
                    _listener: listener,
                });
            }
            _ => {}
        })
        .global_remove(move |id| {
            let is_metadata = remove_metadata
                .borrow()
                .as_ref()
                .is_some_and(|bound| bound.id == id);
            let changed = if is_metadata {
                warn!("Default metadata {} went away", id);
                remove_metadata.borrow_mut().take();
                remove_shared.graph.lock().set_default(None, None)
            } else {
                remove_shared.graph.lock().remove(id)
            };
            remove_shared.notify(&changed);
        })
        .register();

    // Everything the registry announced up to now arrives before this reply
    let pending = core
        .sync(0)
        .map_err(|e| ArgonError::pipewire(format!("Failed to sync with PipeWire: {}", e)))?;
    let _core_listener = core
        .add_listener_local()
        .done(move |id, seq| {
            if id == pw::core::PW_ID_CORE && seq == pending {
                let _ = ready.send(Ok(()));
            }
        })
        .error(|id, seq, res, message| {
            error!("PipeWire error on {} (seq {}, {}): {}", id, seq, res, message);
        })
        .register();

    let mainloop_weak = mainloop.downgrade();
    let control_shared = shared.clone();
    let control_metadata = metadata.clone();
    let _control = control_rx.attach(mainloop.loop_(), move |control| match control {
        Control::Retarget { stream, device } => {
            debug!("Playback stream '{}' should play on device {}", stream, device);
            control_shared.graph.lock().target = Some((stream, device));
            apply_target(&control_shared, &control_metadata);
        }
        Control::Shutdown => {
            info!("Audio graph shutdown requested");
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    mainloop.run();

    metadata.borrow_mut().take();
    info!("PipeWire audio loop ended");
    Ok(())
}
