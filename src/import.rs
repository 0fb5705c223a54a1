//! Standard MIDI File import.
//!
//! Turns a `.mid` file into a [`Track`]. All tracks of the file are merged
//! into one time-ordered event list; only note on/off messages are kept.
//! The track length is the furthest end-of-track position in the file, so a
//! groove with trailing silence keeps its full bar length.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use midly::{MidiMessage, Smf, Timing, TrackEventKind};

use crate::track::{EventKind, Track, TrackEvent};

/// Load a MIDI file, naming the track after the file stem.
pub fn track_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Track> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");

    let data =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    track_from_bytes(name, &data).with_context(|| format!("failed to import {}", path.display()))
}

/// Parse SMF bytes into a track.
pub fn track_from_bytes(name: &str, data: &[u8]) -> anyhow::Result<Track> {
    let smf = Smf::parse(data).map_err(|e| anyhow!("failed to parse MIDI: {}", e))?;

    let ppqn = match smf.header.timing {
        Timing::Metrical(ppq) => ppq.as_int(),
        Timing::Timecode(_, _) => bail!("timecode-based MIDI files not supported"),
    };

    // (absolute tick, event with delta still unset)
    let mut notes: Vec<(u64, TrackEvent)> = Vec::new();
    let mut length_ticks: u64 = 0;

    for track in &smf.tracks {
        let mut tick: u64 = 0;

        for event in track.iter() {
            tick += event.delta.as_int() as u64;

            if let TrackEventKind::Midi { message, .. } = event.kind {
                let (kind, key, velocity) = match message {
                    MidiMessage::NoteOn { key, vel } => (EventKind::NoteOn, key, vel),
                    MidiMessage::NoteOff { key, vel } => (EventKind::NoteOff, key, vel),
                    _ => continue,
                };
                notes.push((
                    tick,
                    TrackEvent {
                        kind,
                        key: key.as_int(),
                        velocity: velocity.as_int(),
                        delta_ticks: 0,
                    },
                ));
            }
        }

        length_ticks = length_ticks.max(tick);
    }

    // Stable: simultaneous events keep file order
    notes.sort_by_key(|(tick, _)| *tick);

    let mut events = Vec::with_capacity(notes.len() + 1);
    let mut last_tick = 0;
    for (tick, mut event) in notes {
        event.delta_ticks = u32::try_from(tick - last_tick)?;
        last_tick = tick;
        events.push(event);
    }
    events.push(TrackEvent::end_of_track(u32::try_from(length_ticks - last_tick)?));

    Ok(Track::new(name, ppqn, events)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble an SMF from raw track chunk bodies.
    fn smf(format: u16, division: [u8; 2], tracks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&format.to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division);
        for body in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    /// Kick on beat 1, one bar long at 96 ppqn.
    const KICK: &[u8] = &[
        0x00, 0x90, 36, 100, // note on
        0x30, 0x80, 36, 64, // +48 note off
        0x82, 0x50, 0xFF, 0x2F, 0x00, // +336 end of track
    ];

    /// Snare on beat 2, ends right after the note.
    const SNARE: &[u8] = &[
        0x60, 0x90, 38, 80, // +96 note on
        0x30, 0x80, 38, 64, // +48 note off
        0x00, 0xFF, 0x2F, 0x00,
    ];

    #[test]
    fn test_single_track_import() {
        let track = track_from_bytes("kick", &smf(0, [0x00, 0x60], &[KICK])).unwrap();

        assert_eq!(track.name(), "kick");
        assert_eq!(track.ppqn().get(), 96);
        assert_eq!(track.length_ticks(), 384);
        assert_eq!(
            track.events(),
            &[
                TrackEvent {
                    kind: EventKind::NoteOn,
                    key: 36,
                    velocity: 100,
                    delta_ticks: 0
                },
                TrackEvent {
                    kind: EventKind::NoteOff,
                    key: 36,
                    velocity: 64,
                    delta_ticks: 48
                },
                TrackEvent::end_of_track(336),
            ]
        );
    }

    #[test]
    fn test_tracks_are_merged_by_tick() {
        let track = track_from_bytes("kit", &smf(1, [0x00, 0x60], &[KICK, SNARE])).unwrap();

        let positioned: Vec<(u64, u8, EventKind)> = track
            .positioned()
            .map(|(tick, e)| (tick, e.key, e.kind))
            .collect();
        assert_eq!(
            positioned,
            vec![
                (0, 36, EventKind::NoteOn),
                (48, 36, EventKind::NoteOff),
                (96, 38, EventKind::NoteOn),
                (144, 38, EventKind::NoteOff),
                (384, 0, EventKind::EndOfTrack),
            ]
        );
        assert_eq!(track.length_ticks(), 384);
    }

    #[test]
    fn test_timecode_division_rejected() {
        // -25 fps, 40 ticks per frame
        let err = track_from_bytes("smpte", &smf(0, [0xE7, 0x28], &[KICK])).unwrap_err();
        assert!(err.to_string().contains("timecode"), "{}", err);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(track_from_bytes("junk", b"not a midi file").is_err());
    }

    #[test]
    fn test_empty_track_rejected() {
        let silent: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
        assert!(track_from_bytes("silent", &smf(0, [0x00, 0x60], &[silent])).is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = track_from_file("/nonexistent/groove.mid").unwrap_err();
        assert!(err.to_string().contains("groove.mid"), "{}", err);
    }
}
