//! Pedal press simulator.
//!
//! Sends the Note On/Note Off pair a footswitch would send for pedal `n`,
//! so the player can be driven without hardware.
//! Usage: cargo run --bin pedal -- <n> [--base <note>] [--port <name>]

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use midir::MidiOutput;

/// Keep in step with `midi::DEFAULT_TRIGGER_BASE_NOTE`.
const DEFAULT_BASE_NOTE: u8 = 59;
const PRESS_LENGTH: Duration = Duration::from_millis(50);

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let arg = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let pedal: u8 = args
        .first()
        .context("usage: pedal <n> [--base <note>] [--port <name>]")?
        .parse()
        .context("pedal number must be 1-68")?;
    let base_note: u8 = match arg("--base") {
        Some(s) => s.parse().context("base note must be 0-127")?,
        None => DEFAULT_BASE_NOTE,
    };
    let note = base_note
        .checked_add(pedal)
        .filter(|n| pedal > 0 && *n <= 127)
        .ok_or_else(|| anyhow!("pedal {} is out of range for base note {}", pedal, base_note))?;

    let midi_out = MidiOutput::new("pedal-trigger")?;
    let ports = midi_out.ports();
    if ports.is_empty() {
        bail!("no MIDI output ports found");
    }

    // Preferred port, then IAC Driver, then first port
    let preferred = arg("--port");
    let port_idx = ports
        .iter()
        .position(|p| {
            midi_out
                .port_name(p)
                .map(|n| match preferred.as_deref() {
                    Some(want) => n.contains(want),
                    None => n.contains("IAC"),
                })
                .unwrap_or(false)
        })
        .unwrap_or(0);

    let port = &ports[port_idx];
    let port_name = midi_out.port_name(port)?;

    let mut conn = midi_out
        .connect(port, "pedal-trigger")
        .map_err(|e| anyhow!("failed to connect to {}: {}", port_name, e))?;

    conn.send(&[0x90, note, 127])
        .map_err(|e| anyhow!("failed to send: {}", e))?;
    thread::sleep(PRESS_LENGTH);
    conn.send(&[0x80, note, 0])
        .map_err(|e| anyhow!("failed to send: {}", e))?;

    println!("Pedal {} (note {}) sent to: {}", pedal, note, port_name);
    Ok(())
}
