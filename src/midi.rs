//! MIDI short message type and the 64-bit wire encoding
//!
//! A short message is a status byte plus up to two data bytes, tagged with
//! the endpoint it arrived on. The host-facing ABI moves messages as single
//! `u64` values, so the codec here packs and unpacks that representation.

use std::fmt;

/// Stable identifier of an open MIDI input endpoint.
///
/// Assigned by the device registry from a process-wide counter starting at 1;
/// 0 never names a real endpoint.
pub type EndpointId = u32;

/// The "no data" / "unknown" sentinel used across the library boundary.
pub const SENTINEL: u64 = 0;

/// A MIDI short message received from an input endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortMessage {
    /// Endpoint the message arrived on
    pub source: EndpointId,
    /// Status byte (e.g. 0x90 = Note On channel 1)
    pub status: u8,
    /// First data byte, 0 if the message carried none
    pub data1: u8,
    /// Second data byte, 0 if the message carried none
    pub data2: u8,
}

impl ShortMessage {
    pub fn new(source: EndpointId, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            source,
            status,
            data1,
            data2,
        }
    }

    /// Pack into the fixed 64-bit layout:
    /// bits 0-31 source, 32-39 status, 40-47 data1, 48-55 data2, top byte zero.
    ///
    /// Note: the all-zero message encodes to 0, which collides with the
    /// "no data" sentinel. Registered endpoints always have a non-zero id,
    /// so a message produced by the ingestion path never encodes to 0.
    pub fn encode(&self) -> u64 {
        let mut value = self.source as u64;
        value |= (self.status as u64) << 32;
        value |= (self.data1 as u64) << 40;
        value |= (self.data2 as u64) << 48;
        value
    }

    /// Exact inverse of [`encode`](Self::encode). Bits 56-63 are ignored.
    pub fn decode(value: u64) -> Self {
        Self {
            source: (value & 0xFFFF_FFFF) as EndpointId,
            status: ((value >> 32) & 0xFF) as u8,
            data1: ((value >> 40) & 0xFF) as u8,
            data2: ((value >> 48) & 0xFF) as u8,
        }
    }

    /// High nibble of the status byte (0x80 note off, 0x90 note on, ...).
    pub fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    /// Channel of a channel-voice message (0-15), None for system messages.
    pub fn channel(&self) -> Option<u8> {
        if self.status >= 0x80 && self.status < 0xF0 {
            Some(self.status & 0x0F)
        } else {
            None
        }
    }
}

impl fmt::Display for ShortMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:X}) {:02X} {:02X} {:02X}",
            self.source, self.status, self.data1, self.data2
        )
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
