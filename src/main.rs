//! midilink-monitor - console client for the exported MIDI surface
//!
//! Exercises the same C ABI a host application would use: refresh, endpoint
//! enumeration, and the per-frame dequeue loop.

use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::*;
use tracing::info;

use midilink::ffi::{
    MidiLinkDequeueIncomingData, MidiLinkGetEndpointIDAtIndex, MidiLinkGetEndpointName,
    MidiLinkRefreshEndpoints,
};
use midilink::ShortMessage;

/// MidiLink monitor - list MIDI input endpoints and log incoming messages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Polling interval in milliseconds (one "frame")
    #[arg(short, long, default_value = "16")]
    interval_ms: u64,

    /// List endpoints and exit without entering the polling loop
    #[arg(long)]
    list_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting midilink-monitor...");

    // Open every input device and drain anything buffered before listing,
    // mirroring how hosts use the surface.
    let count = MidiLinkRefreshEndpoints();
    while MidiLinkDequeueIncomingData() != 0 {}

    println!("{}", format!("Detected {} endpoints:", count).bold().cyan());
    for index in 0..count {
        let id = MidiLinkGetEndpointIDAtIndex(index);
        println!(
            "- {:3}: {} {}",
            index,
            format!("0x{:08X}", id).yellow(),
            endpoint_name(id)
        );
    }

    if args.list_only {
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    println!("\n{}", "MIDI message log (Ctrl+C to exit):".green());
    while running.load(Ordering::SeqCst) {
        // Process everything that arrived during this "frame"
        loop {
            let value = MidiLinkDequeueIncomingData();
            if value == 0 {
                break;
            }
            let msg = ShortMessage::decode(value);
            println!(
                "{} ({}): {}",
                format!("0x{:08X}", msg.source).yellow(),
                endpoint_name(msg.source),
                format!("0x{:02X} 0x{:02X} 0x{:02X}", msg.status, msg.data1, msg.data2).bold()
            );
        }

        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }

    info!("midilink-monitor shutdown complete");
    Ok(())
}

/// Read the name buffer returned by the C surface into an owned String.
fn endpoint_name(id: u32) -> String {
    let ptr = MidiLinkGetEndpointName(id);
    if ptr.is_null() {
        return "unknown".to_string();
    }
    // Valid until the next MidiLinkGetEndpointName call; copied out here
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}
