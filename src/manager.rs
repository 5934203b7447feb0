//! Device lifecycle manager and driver-callback ingestion.
//!
//! Owns every open MIDI input connection plus the registry describing it.
//! `open_all` / `close_all` / `refresh` drive the Closed ⇄ Open transitions;
//! the OS driver delivers incoming bytes to a per-connection callback that
//! reduces them to a [`ShortMessage`] and pushes it onto the shared queue.
//!
//! The OS surface sits behind [`InputBackend`] so the lifecycle logic can be
//! exercised without hardware.

use std::sync::Arc;

use midir::{Ignore, MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::midi::{EndpointId, ShortMessage, SENTINEL};
use crate::queue::MessageQueue;
use crate::registry::{DeviceInfo, DeviceRegistry};

/// Fallback name for endpoints that are not currently registered.
pub const UNKNOWN_ENDPOINT: &str = "unknown";

/// Client name reported to the OS MIDI subsystem.
const CLIENT_NAME: &str = "midilink";

/// Guard owning one open input stream. Dropping it closes the stream and
/// stops callback delivery.
pub trait InputConnection: Send {}

impl InputConnection for MidiInputConnection<()> {}

/// Result of a successful backend connect.
pub struct OpenedInput {
    /// Display name reported by the OS
    pub name: String,
    /// Keep-alive guard; the stream closes when this drops
    pub connection: Box<dyn InputConnection>,
}

/// OS MIDI surface used by the lifecycle manager.
pub trait InputBackend: Send + Sync {
    /// Number of input devices the OS currently reports.
    fn device_count(&self) -> Result<usize>;

    /// Open the device at `port_index` and start delivery. Incoming payloads
    /// must be fed through [`ingest`] with `endpoint_id` and `queue`.
    ///
    /// All-or-nothing: on error every partially acquired OS resource for this
    /// device has been released.
    fn connect(
        &self,
        port_index: usize,
        endpoint_id: EndpointId,
        queue: Arc<MessageQueue>,
    ) -> Result<OpenedInput>;
}

/// Production backend over `midir`.
pub struct MidirBackend;

impl InputBackend for MidirBackend {
    fn device_count(&self) -> Result<usize> {
        Ok(MidiInput::new(CLIENT_NAME)?.port_count())
    }

    fn connect(
        &self,
        port_index: usize,
        endpoint_id: EndpointId,
        queue: Arc<MessageQueue>,
    ) -> Result<OpenedInput> {
        let mut midi_in = MidiInput::new(CLIENT_NAME)?;
        midi_in.ignore(Ignore::None);

        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or(Error::PortVanished(port_index))?;
        let name = midi_in.port_name(port)?;

        // The endpoint id is fixed for the connection's lifetime, so the
        // callback needs no registry access on the hot path.
        let connection = midi_in.connect(
            port,
            "midilink-in",
            move |_timestamp, bytes, _| {
                ingest(endpoint_id, bytes, &queue);
            },
            (),
        )?;

        Ok(OpenedInput {
            name,
            connection: Box::new(connection),
        })
    }
}

/// Driver-callback body: reduce a raw payload to a short message and queue it.
///
/// Runs on an OS-owned thread. SysEx and empty payloads are outside the
/// short-message contract and are dropped; messages shorter than three bytes
/// pad the missing data bytes with zero.
pub fn ingest(endpoint_id: EndpointId, bytes: &[u8], queue: &MessageQueue) {
    let (&status, data) = match bytes.split_first() {
        Some(split) => split,
        None => return,
    };
    if status == 0xF0 {
        trace!("endpoint {}: ignoring SysEx ({} bytes)", endpoint_id, bytes.len());
        return;
    }

    let msg = ShortMessage::new(
        endpoint_id,
        status,
        data.first().copied().unwrap_or(0),
        data.get(1).copied().unwrap_or(0),
    );
    trace!("endpoint {}: RX {}", endpoint_id, msg);
    queue.push(msg);
}

struct OpenDevice {
    endpoint_id: EndpointId,
    // Held only to keep the stream open; dropped on close
    _connection: Box<dyn InputConnection>,
}

struct Inner {
    registry: DeviceRegistry,
    connections: Vec<OpenDevice>,
}

/// Manager for every open MIDI input device and the shared incoming queue.
///
/// One mutex guards the registry and connection table together, so a device
/// is either fully registered or fully absent from the outside. The queue has
/// its own lock; driver callbacks touch only that one.
pub struct DeviceManager {
    inner: Mutex<Inner>,
    queue: Arc<MessageQueue>,
    backend: Box<dyn InputBackend>,
}

impl DeviceManager {
    pub fn new(backend: Box<dyn InputBackend>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                registry: DeviceRegistry::new(),
                connections: Vec::new(),
            }),
            queue: Arc::new(MessageQueue::new()),
            backend,
        }
    }

    /// Manager over the real OS MIDI subsystem.
    pub fn with_midir() -> Self {
        Self::new(Box::new(MidirBackend))
    }

    /// Attempt to open every input device the OS reports. A device that fails
    /// to open is skipped; the rest still open. Returns the active count.
    pub fn open_all(&self) -> usize {
        let mut inner = self.inner.lock();
        self.open_all_locked(&mut inner);
        inner.registry.len()
    }

    /// Close every open device.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock();
        Self::close_all_locked(&mut inner);
    }

    /// Close all devices, then reopen everything the OS reports, under a
    /// single lock acquisition. The only disconnect-detection mechanism;
    /// every previously issued endpoint id becomes stale. Returns the new
    /// active count.
    pub fn refresh(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::close_all_locked(&mut inner);
        self.open_all_locked(&mut inner);
        inner.registry.len()
    }

    /// Number of currently open endpoints.
    pub fn count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    /// Endpoint id at an enumeration index, None if out of range.
    pub fn endpoint_at(&self, index: usize) -> Option<EndpointId> {
        self.inner.lock().registry.endpoint_at(index)
    }

    /// Display name for an endpoint, or [`UNKNOWN_ENDPOINT`] if the id is not
    /// currently registered.
    pub fn endpoint_name(&self, endpoint_id: EndpointId) -> String {
        self.inner
            .lock()
            .registry
            .name(endpoint_id)
            .unwrap_or(UNKNOWN_ENDPOINT)
            .to_string()
    }

    /// Snapshot of the open devices in enumeration order.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.inner.lock().registry.iter().cloned().collect()
    }

    /// Remove and return the oldest buffered message.
    pub fn try_dequeue(&self) -> Option<ShortMessage> {
        self.queue.try_pop()
    }

    /// Oldest buffered message in the 64-bit wire encoding, or the sentinel 0
    /// if the queue is empty.
    pub fn dequeue_encoded(&self) -> u64 {
        match self.queue.try_pop() {
            Some(msg) => msg.encode(),
            None => SENTINEL,
        }
    }

    /// Shared incoming queue (producer side is owned by the connections).
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    fn open_all_locked(&self, inner: &mut Inner) {
        let count = match self.backend.device_count() {
            Ok(count) => count,
            Err(e) => {
                warn!("MIDI device enumeration failed: {}", e);
                return;
            }
        };

        for port_index in 0..count {
            if let Err(e) = self.open_device_locked(inner, port_index) {
                warn!("skipping MIDI input {}: {}", port_index, e);
            }
        }
    }

    fn open_device_locked(&self, inner: &mut Inner, port_index: usize) -> Result<()> {
        let endpoint_id = inner.registry.allocate_id();
        let opened = self
            .backend
            .connect(port_index, endpoint_id, self.queue.clone())?;

        debug!(
            "opened MIDI input {} '{}' as endpoint {}",
            port_index, opened.name, endpoint_id
        );
        inner.registry.register(endpoint_id, port_index, opened.name);
        inner.connections.push(OpenDevice {
            endpoint_id,
            _connection: opened.connection,
        });
        Ok(())
    }

    fn close_all_locked(inner: &mut Inner) {
        while let Some(open) = inner.connections.pop() {
            debug!("closing endpoint {}", open.endpoint_id);
            inner.registry.unregister(open.endpoint_id);
            // Dropping the guard closes the OS stream
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Scriptable backend: a fixed device list, per-index failure injection,
    /// and a tap table the tests use to play the role of the OS driver.
    #[derive(Default)]
    struct FakeBackend {
        devices: Vec<&'static str>,
        failing: HashSet<usize>,
        taps: Arc<Mutex<Vec<(EndpointId, Arc<MessageQueue>)>>>,
    }

    struct FakeConnection {
        endpoint_id: EndpointId,
        taps: Arc<Mutex<Vec<(EndpointId, Arc<MessageQueue>)>>>,
    }

    impl InputConnection for FakeConnection {}

    impl Drop for FakeConnection {
        fn drop(&mut self) {
            self.taps.lock().retain(|(id, _)| *id != self.endpoint_id);
        }
    }

    impl FakeBackend {
        fn new(devices: &[&'static str]) -> Self {
            Self {
                devices: devices.to_vec(),
                ..Default::default()
            }
        }

        fn with_failing(devices: &[&'static str], failing: &[usize]) -> Self {
            Self {
                devices: devices.to_vec(),
                failing: failing.iter().copied().collect(),
                ..Default::default()
            }
        }

        /// Deliver a payload on the n-th currently open connection, the way
        /// the OS driver would.
        fn deliver(taps: &Arc<Mutex<Vec<(EndpointId, Arc<MessageQueue>)>>>, nth: usize, bytes: &[u8]) {
            let (endpoint_id, queue) = {
                let taps = taps.lock();
                let (id, queue) = &taps[nth];
                (*id, queue.clone())
            };
            ingest(endpoint_id, bytes, &queue);
        }
    }

    impl InputBackend for FakeBackend {
        fn device_count(&self) -> Result<usize> {
            Ok(self.devices.len())
        }

        fn connect(
            &self,
            port_index: usize,
            endpoint_id: EndpointId,
            queue: Arc<MessageQueue>,
        ) -> Result<OpenedInput> {
            if self.failing.contains(&port_index) {
                return Err(Error::Connect(format!("injected failure at {}", port_index)));
            }
            let name = self
                .devices
                .get(port_index)
                .ok_or(Error::PortVanished(port_index))?
                .to_string();
            self.taps.lock().push((endpoint_id, queue));
            Ok(OpenedInput {
                name,
                connection: Box::new(FakeConnection {
                    endpoint_id,
                    taps: self.taps.clone(),
                }),
            })
        }
    }

    fn manager_with(backend: FakeBackend) -> (DeviceManager, Arc<Mutex<Vec<(EndpointId, Arc<MessageQueue>)>>>) {
        let taps = backend.taps.clone();
        (DeviceManager::new(Box::new(backend)), taps)
    }

    #[test]
    fn test_open_all_registers_every_device() {
        let (manager, _) = manager_with(FakeBackend::new(&["Keys", "Pads", "Faders"]));

        assert_eq!(manager.open_all(), 3);
        assert_eq!(manager.count(), 3);

        let names: Vec<_> = manager.devices().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["Keys", "Pads", "Faders"]);
    }

    #[test]
    fn test_open_failure_skips_only_that_device() {
        let (manager, _) = manager_with(FakeBackend::with_failing(&["Keys", "Pads", "Faders"], &[1]));

        assert_eq!(manager.open_all(), 2);
        let names: Vec<_> = manager.devices().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["Keys", "Faders"]);
    }

    #[test]
    fn test_index_enumeration_distinct_ids() {
        let (manager, _) = manager_with(FakeBackend::new(&["A", "B", "C", "D"]));
        manager.open_all();

        let ids: HashSet<_> = (0..manager.count())
            .map(|i| manager.endpoint_at(i).unwrap())
            .collect();
        assert_eq!(ids.len(), 4);
        assert!(!ids.contains(&0));
        assert_eq!(manager.endpoint_at(4), None);
    }

    #[test]
    fn test_close_all_releases_connections() {
        let (manager, taps) = manager_with(FakeBackend::new(&["Keys", "Pads"]));
        manager.open_all();
        assert_eq!(taps.lock().len(), 2);

        let id = manager.endpoint_at(0).unwrap();
        manager.close_all();

        assert_eq!(manager.count(), 0);
        assert_eq!(taps.lock().len(), 0); // OS streams were dropped
        assert_eq!(manager.endpoint_name(id), UNKNOWN_ENDPOINT);
    }

    #[test]
    fn test_refresh_keeps_count_and_renews_ids() {
        let (manager, _) = manager_with(FakeBackend::new(&["Keys", "Pads", "Faders"]));
        manager.open_all();

        let before: HashSet<_> = (0..3).map(|i| manager.endpoint_at(i).unwrap()).collect();
        assert_eq!(manager.refresh(), 3);
        let after: HashSet<_> = (0..3).map(|i| manager.endpoint_at(i).unwrap()).collect();

        assert_eq!(after.len(), 3);
        // Reopened devices get fresh identifiers; the old ones are stale
        assert!(before.is_disjoint(&after));
        for id in before {
            assert_eq!(manager.endpoint_name(id), UNKNOWN_ENDPOINT);
        }
    }

    #[test]
    fn test_delivered_bytes_reach_the_queue() {
        let (manager, taps) = manager_with(FakeBackend::new(&["Keys", "Pads"]));
        manager.open_all();

        FakeBackend::deliver(&taps, 0, &[0x90, 60, 100]);
        FakeBackend::deliver(&taps, 1, &[0xB0, 7, 127]);

        let first = manager.try_dequeue().unwrap();
        assert_eq!(first.source, manager.endpoint_at(0).unwrap());
        assert_eq!((first.status, first.data1, first.data2), (0x90, 60, 100));

        let second = manager.try_dequeue().unwrap();
        assert_eq!(second.source, manager.endpoint_at(1).unwrap());
        assert_eq!(second.status, 0xB0);

        assert_eq!(manager.try_dequeue(), None);
        assert_eq!(manager.dequeue_encoded(), SENTINEL);
    }

    #[test]
    fn test_short_payloads_pad_with_zero() {
        let queue = MessageQueue::new();
        ingest(7, &[0xC0, 5], &queue); // program change: one data byte
        assert_eq!(queue.try_pop(), Some(ShortMessage::new(7, 0xC0, 5, 0)));

        ingest(7, &[0xF8], &queue); // clock: status only
        assert_eq!(queue.try_pop(), Some(ShortMessage::new(7, 0xF8, 0, 0)));
    }

    #[test]
    fn test_sysex_and_empty_payloads_are_dropped() {
        let queue = MessageQueue::new();
        ingest(7, &[0xF0, 0x7E, 0x01, 0xF7], &queue);
        ingest(7, &[], &queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_name_lookup_with_fallback() {
        let (manager, _) = manager_with(FakeBackend::new(&["Keys"]));
        manager.open_all();

        let id = manager.endpoint_at(0).unwrap();
        assert_eq!(manager.endpoint_name(id), "Keys");
        assert_eq!(manager.endpoint_name(0xDEAD), UNKNOWN_ENDPOINT);
    }
}
