//! Trigger Monitor - Console tool for checking footswitch wiring
//!
//! Prints every incoming message with the pedal it maps to.
//! Usage: cargo run --bin trigger_monitor -- [--base <note>] [--port <name>] [--duration <secs>]

use std::io::{self, Write};

use chrono::Local;
use midir::MidiInput;

/// Pedal `n` sends note `base + n`. Keep in step with `midi::DEFAULT_TRIGGER_BASE_NOTE`.
const DEFAULT_BASE_NOTE: u8 = 59;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let arg = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let base_note: u8 = arg("--base")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_BASE_NOTE);
    let preferred = arg("--port");

    println!("=== Trigger Monitor ===");
    println!("Pedal n = note {} + n\n", base_note);

    let midi_in = match MidiInput::new("trigger-monitor") {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to create MIDI input: {}", e);
            return;
        }
    };

    let ports = midi_in.ports();
    if ports.is_empty() {
        eprintln!("No MIDI input ports found!");
        return;
    }

    println!("Available MIDI input ports:");
    let names: Vec<String> = ports
        .iter()
        .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "Unknown".to_string()))
        .collect();
    for (i, name) in names.iter().enumerate() {
        println!("  {}: {}", i, name);
    }
    println!();

    // Preferred port, then IAC Driver, then first port
    let find = |needle: &str| names.iter().position(|n| n.contains(needle));
    let port_idx = preferred
        .as_deref()
        .and_then(find)
        .or_else(|| find("IAC"))
        .unwrap_or(0);

    println!("Connecting to: {}\n", names[port_idx]);
    println!("{:<14} {:<12} {:<14} {}", "TIME", "DATA (HEX)", "NOTE", "PEDAL");
    println!("{}", "-".repeat(56));

    let connection = midi_in.connect(
        &ports[port_idx],
        "trigger-monitor-in",
        move |_timestamp, message, _| {
            print_trigger(message, base_note);
        },
        (),
    );

    match connection {
        Ok(conn) => {
            let duration_secs: Option<u64> = arg("--duration").and_then(|s| s.parse().ok());

            if let Some(secs) = duration_secs {
                println!("\nMonitoring for {} seconds...\n", secs);
                std::thread::sleep(std::time::Duration::from_secs(secs));
            } else {
                println!("\nPress Enter to quit (or use --duration <secs>)...\n");
                let mut input = String::new();
                let _ = io::stdin().read_line(&mut input);
            }
            drop(conn);
        }
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
        }
    }
}

fn print_trigger(message: &[u8], base_note: u8) {
    // Clock and active sensing would flood the console
    if message.len() < 3 || message[0] >= 0xF0 {
        return;
    }

    let hex_str: String = message.iter().map(|b| format!("{:02X} ", b)).collect();
    let time = Local::now().format("%H:%M:%S%.3f");

    let note = message[1];
    let pedal = match pedal_for(message, base_note) {
        Some(pedal) => format!("pedal {}", pedal),
        None if message[0] & 0xF0 == 0x90 && message[2] > 0 => "(below base)".to_string(),
        None => "-".to_string(),
    };

    println!("{:<14} {:<12} {:<14} {}", time, hex_str.trim(), note_name(note), pedal);
    let _ = io::stdout().flush();
}

/// Pedal number for a Note On press, if the note is above the base.
fn pedal_for(message: &[u8], base_note: u8) -> Option<usize> {
    let &[status, note, velocity, ..] = message else {
        return None;
    };
    if status & 0xF0 != 0x90 || velocity == 0 || note <= base_note {
        return None;
    }
    Some((note - base_note) as usize)
}

fn note_name(note: u8) -> String {
    let names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i8 - 1;
    let name = names[(note % 12) as usize];
    format!("{}{} ({})", name, octave, note)
}
