//! Exported C ABI for host applications.
//!
//! Thin, sentinel-returning wrappers over [`DeviceManager`]. The boundary has
//! no error-propagation contract, so every failure path degrades to "endpoint
//! not available" or "no data": 0 for ids and encoded messages, `"unknown"`
//! for names. Panics are caught at the boundary and mapped the same way.
//!
//! Process-wide state is created on first use and torn down only with the
//! process; hosts that need a clean slate call `MidiLinkRefreshEndpoints`.

// Exported symbol names follow the host-facing convention, not Rust's
#![allow(non_snake_case)]

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::manager::{DeviceManager, UNKNOWN_ENDPOINT};
use crate::midi::SENTINEL;

static MANAGER: Lazy<DeviceManager> = Lazy::new(DeviceManager::with_midir);

/// Backing storage for the pointer returned by `MidiLinkGetEndpointName`.
/// The pointer stays valid until the next call, matching the documented
/// contract of the boundary.
static NAME_BUFFER: Lazy<Mutex<CString>> = Lazy::new(|| Mutex::new(CString::default()));

fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(fallback)
}

/// Force-close every connected endpoint and recreate the set from scratch.
/// Returns the number of active endpoints afterwards.
#[no_mangle]
pub extern "C" fn MidiLinkRefreshEndpoints() -> i32 {
    guarded(0, || MANAGER.refresh() as i32)
}

/// Number of currently active endpoints.
#[no_mangle]
pub extern "C" fn MidiLinkCountEndpoints() -> i32 {
    guarded(0, || MANAGER.count() as i32)
}

/// Endpoint id at an enumeration index, or 0 if the index is out of range.
#[no_mangle]
pub extern "C" fn MidiLinkGetEndpointIDAtIndex(index: i32) -> u32 {
    guarded(0, || {
        usize::try_from(index)
            .ok()
            .and_then(|i| MANAGER.endpoint_at(i))
            .unwrap_or(0)
    })
}

/// Display name of an endpoint, or `"unknown"` for an id that is not
/// currently registered. The returned pointer is valid until the next call.
#[no_mangle]
pub extern "C" fn MidiLinkGetEndpointName(id: u32) -> *const c_char {
    guarded(std::ptr::null(), || {
        let name = MANAGER.endpoint_name(id);
        // Interior NULs cannot come from a sane port name; fall back if so
        let cstring = CString::new(name)
            .unwrap_or_else(|_| CString::new(UNKNOWN_ENDPOINT).expect("literal has no NUL"));
        let mut buffer = NAME_BUFFER.lock();
        *buffer = cstring;
        buffer.as_ptr()
    })
}

/// Remove and return the oldest buffered message in the 64-bit encoding,
/// or 0 if the queue is empty.
#[no_mangle]
pub extern "C" fn MidiLinkDequeueIncomingData() -> u64 {
    guarded(SENTINEL, || MANAGER.dequeue_encoded())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::CStr;

    // These exercise the process-wide surface against the real backend; on a
    // machine with no MIDI devices the active set is simply empty.

    #[test]
    #[serial]
    fn test_count_is_nonnegative() {
        assert!(MidiLinkCountEndpoints() >= 0);
    }

    #[test]
    #[serial]
    fn test_out_of_range_index_yields_sentinel() {
        let count = MidiLinkCountEndpoints();
        assert_eq!(MidiLinkGetEndpointIDAtIndex(count), 0);
        assert_eq!(MidiLinkGetEndpointIDAtIndex(-1), 0);
    }

    #[test]
    #[serial]
    fn test_unknown_endpoint_name() {
        // Id 0 is never assigned
        let ptr = MidiLinkGetEndpointName(0);
        assert!(!ptr.is_null());
        let name = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(name.to_str().unwrap(), UNKNOWN_ENDPOINT);
    }

    #[test]
    #[serial]
    fn test_enumerated_ids_are_distinct_and_named() {
        let count = MidiLinkRefreshEndpoints();
        let mut seen = std::collections::HashSet::new();
        for i in 0..count {
            let id = MidiLinkGetEndpointIDAtIndex(i);
            assert_ne!(id, 0);
            assert!(seen.insert(id));
            let ptr = MidiLinkGetEndpointName(id);
            assert!(!ptr.is_null());
        }
    }

    #[test]
    #[serial]
    fn test_dequeue_drains_to_sentinel() {
        // Whatever arrived so far, draining must terminate at the sentinel
        // once no devices are producing.
        let mut guard = 0;
        while MidiLinkDequeueIncomingData() != 0 {
            guard += 1;
            assert!(guard < 1_000_000, "queue did not drain");
        }
        assert_eq!(MidiLinkDequeueIncomingData(), 0);
    }
}
