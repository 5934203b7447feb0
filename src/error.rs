//! Error types for the device layer.
//!
//! None of these ever cross the C ABI; `ffi` maps every failure path to the
//! sentinel values the boundary defines.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI subsystem init failed: {0}")]
    Init(String),

    #[error("failed to connect to MIDI input port: {0}")]
    Connect(String),

    #[error("failed to read port name: {0}")]
    PortName(String),

    #[error("MIDI input port {0} disappeared during enumeration")]
    PortVanished(usize),
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Init(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Connect(e.to_string())
    }
}

impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Error::PortName(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
