//! Registry of currently open MIDI input endpoints.
//!
//! Tracks one [`DeviceInfo`] per open endpoint plus the open-order list that
//! backs index-based enumeration. Endpoint identifiers come from a counter
//! starting at 1, so an id is unique for the process lifetime and never 0
//! (0 is the sentinel across the library boundary).
//!
//! The registry is not internally synchronized; the lifecycle manager wraps
//! it (together with the connection table) in one mutex, so every mutation
//! and every consistency-sensitive read happens under that lock.

use std::collections::HashMap;

use crate::midi::EndpointId;

/// Metadata for one open MIDI input endpoint.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Stable identifier handed out across the library boundary
    pub endpoint_id: EndpointId,
    /// OS enumeration index the device was opened at (stale after refresh)
    pub port_index: usize,
    /// Display name reported by the OS
    pub name: String,
}

/// Mapping between endpoint identifiers, device metadata, and open order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<EndpointId, DeviceInfo>,
    /// Open order; defines the index-based enumeration contract
    active: Vec<EndpointId>,
    next_id: EndpointId,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            active: Vec::new(),
            next_id: 1,
        }
    }

    /// Reserve the identifier the next successful registration will use.
    ///
    /// The lifecycle manager needs the id before the OS connect call so the
    /// driver callback can capture it. A reserved id that never gets
    /// registered (connect failed) is simply skipped.
    pub fn allocate_id(&mut self) -> EndpointId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Insert a fully opened device. Appends to the end of the active list,
    /// preserving open order.
    pub fn register(&mut self, endpoint_id: EndpointId, port_index: usize, name: String) {
        debug_assert!(!self.devices.contains_key(&endpoint_id));
        self.devices.insert(
            endpoint_id,
            DeviceInfo {
                endpoint_id,
                port_index,
                name,
            },
        );
        self.active.push(endpoint_id);
    }

    /// Remove a device from every view. No-op for an unknown id.
    pub fn unregister(&mut self, endpoint_id: EndpointId) {
        self.devices.remove(&endpoint_id);
        self.active.retain(|&id| id != endpoint_id);
    }

    /// Number of currently open endpoints.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Endpoint id at an enumeration index, None if out of range.
    pub fn endpoint_at(&self, index: usize) -> Option<EndpointId> {
        self.active.get(index).copied()
    }

    /// Display name for an endpoint, None if not currently registered.
    pub fn name(&self, endpoint_id: EndpointId) -> Option<&str> {
        self.devices.get(&endpoint_id).map(|d| d.name.as_str())
    }

    pub fn info(&self, endpoint_id: EndpointId) -> Option<&DeviceInfo> {
        self.devices.get(&endpoint_id)
    }

    /// Open-order iteration over registered endpoints.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.active.iter().filter_map(|id| self.devices.get(id))
    }
}
