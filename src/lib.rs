//! midilink - MIDI input devices behind a small dynamic-library surface
//!
//! Enumerates the OS MIDI input endpoints, opens them, and buffers incoming
//! short messages in a thread-safe queue. A host application (typically a
//! game engine) polls the queue through the C ABI in [`ffi`]; each message
//! travels as a single `u64` in the fixed layout defined by
//! [`midi::ShortMessage`].
//!
//! Rust consumers can skip the C layer and use [`DeviceManager`] directly.
//! The bundled `midilink-monitor` binary deliberately goes through [`ffi`]
//! so the exported surface gets exercised end to end.

pub mod error;
pub mod ffi;
pub mod manager;
pub mod midi;
pub mod queue;
pub mod registry;

pub use error::{Error, Result};
pub use manager::{DeviceManager, InputBackend, MidirBackend, UNKNOWN_ENDPOINT};
pub use midi::{EndpointId, ShortMessage, SENTINEL};
pub use queue::MessageQueue;
pub use registry::{DeviceInfo, DeviceRegistry};
