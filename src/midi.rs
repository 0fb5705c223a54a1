//! MIDI protocol constants, output sinks and trigger mapping.
//!
//! The player never talks to midir directly. It hands timestamped
//! messages to an [`OutputSink`]; [`MidiOut`] is the hardware sink and
//! dispatches each message at its timestamp from its own worker thread.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;

use crate::scheduler::{DeadlineScheduler, Task};

/// Note On status byte (channel 1)
pub const NOTE_ON: u8 = 0x90;

/// Note Off status byte (channel 1)
pub const NOTE_OFF: u8 = 0x80;

/// Note that sits one below pedal 1. Pedal `n` sends note `base + n`.
pub const DEFAULT_TRIGGER_BASE_NOTE: u8 = 59;

/// Destination for note messages.
pub trait OutputSink: Send {
    /// Deliver a three-byte message at `at`, or immediately when `None`.
    fn send(&mut self, status: u8, data1: u8, data2: u8, at: Option<Instant>);

    /// Drop timed messages that have not gone out yet.
    fn cancel_pending(&mut self) {}
}

/// Replace the channel nibble of a channel-voice status byte.
pub fn with_channel(status: u8, channel: u8) -> u8 {
    (status & 0xF0) | (channel & 0x0F)
}

/// Map a raw input message to a 1-based pedal number.
///
/// Only Note On with non-zero velocity counts as a press. Notes at or below
/// `base_note` do not map to any pedal.
pub fn trigger_pedal(message: &[u8], base_note: u8) -> Option<usize> {
    let &[status, note, velocity, ..] = message else {
        return None;
    };
    if status & 0xF0 != NOTE_ON || velocity == 0 || note <= base_note {
        return None;
    }
    Some((note - base_note) as usize)
}

/// Pick a port: the preferred name if any port contains it, otherwise an
/// IAC Driver port, otherwise the first port.
pub fn choose_port(names: &[String], preferred: Option<&str>) -> Option<usize> {
    if names.is_empty() {
        return None;
    }

    let find = |needle: &str| names.iter().position(|n| n.contains(needle));
    preferred
        .and_then(|p| find(p))
        .or_else(|| find("IAC"))
        .or(Some(0))
}

/// Hardware output through midir.
pub struct MidiOut {
    connection: Arc<Mutex<MidiOutputConnection>>,
    dispatcher: DeadlineScheduler,
    /// 0-15
    channel: u8,
    pub port_name: String,
}

impl MidiOut {
    /// Connect to an output port, see [`choose_port`] for the selection rule.
    pub fn connect(preferred: Option<&str>, channel: u8) -> anyhow::Result<Self> {
        let midi_out = MidiOutput::new("groove-pedal-out")
            .map_err(|e| anyhow!("failed to create MIDI output: {}", e))?;

        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "Unknown".to_string()))
            .collect();

        let idx = choose_port(&names, preferred)
            .ok_or_else(|| anyhow!("no MIDI output ports found"))?;
        let port_name = names[idx].clone();

        let connection = midi_out
            .connect(&ports[idx], "groove-pedal-out")
            .map_err(|e| anyhow!("failed to connect MIDI output {}: {}", port_name, e))?;

        let dispatcher = DeadlineScheduler::new("midi-out")?;

        log::info!("MIDI output connected to: {}", port_name);
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            dispatcher,
            channel: channel & 0x0F,
            port_name,
        })
    }
}

impl OutputSink for MidiOut {
    fn send(&mut self, status: u8, data1: u8, data2: u8, at: Option<Instant>) {
        let message = [with_channel(status, self.channel), data1 & 0x7F, data2 & 0x7F];
        let connection = Arc::clone(&self.connection);
        let task: Task = Box::new(move || {
            if let Err(e) = connection.lock().send(&message) {
                log::warn!("failed to send MIDI {:02X?}: {}", message, e);
            }
        });

        match at {
            Some(at) if at > Instant::now() => {
                self.dispatcher.at(at, task);
            }
            _ => task(),
        }
    }

    fn cancel_pending(&mut self) {
        self.dispatcher.cancel_all();
    }
}

/// A message captured by [`RecordingSink`].
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub at: Option<Instant>,
}

/// Sink that records everything it is given.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    pub cancels: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Note numbers of the Note On messages sent so far.
    pub fn note_ons(&self) -> Vec<u8> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.status & 0xF0 == NOTE_ON)
            .map(|m| m.data1)
            .collect()
    }
}

#[cfg(test)]
impl OutputSink for RecordingSink {
    fn send(&mut self, status: u8, data1: u8, data2: u8, at: Option<Instant>) {
        self.sent.lock().push(SentMessage {
            status,
            data1,
            data2,
            at,
        });
    }

    fn cancel_pending(&mut self) {
        self.cancels
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
