//! Immutable MIDI track model.
//!
//! A [`Track`] is a time-ordered list of note events, each carrying the tick
//! delta since the previous event. Tracks are built once by the importer and
//! shared read-only between patterns and the playback state.

use std::num::NonZeroU16;

use thiserror::Error;

/// What an event does when it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Terminal marker. Only contributes to the track length, never sent.
    EndOfTrack,
}

/// One musical instruction in a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEvent {
    pub kind: EventKind,
    /// Note number (0-127)
    pub key: u8,
    /// Velocity (0-127), meaningful for NoteOn
    pub velocity: u8,
    /// Ticks since the previous event in the same track
    pub delta_ticks: u32,
}

impl TrackEvent {
    pub fn note_on(delta_ticks: u32, key: u8, velocity: u8) -> Self {
        Self {
            kind: EventKind::NoteOn,
            key: key & 0x7F,
            velocity: velocity & 0x7F,
            delta_ticks,
        }
    }

    pub fn note_off(delta_ticks: u32, key: u8) -> Self {
        Self {
            kind: EventKind::NoteOff,
            key: key & 0x7F,
            velocity: 0,
            delta_ticks,
        }
    }

    pub fn end_of_track(delta_ticks: u32) -> Self {
        Self {
            kind: EventKind::EndOfTrack,
            key: 0,
            velocity: 0,
            delta_ticks,
        }
    }

    #[cfg(test)]
    pub fn is_note(&self) -> bool {
        matches!(self.kind, EventKind::NoteOn | EventKind::NoteOff)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("ticks per quarter note must be greater than zero")]
    ZeroPpqn,

    #[error("track has zero length")]
    ZeroLength,
}

/// A parsed track ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    name: String,
    ppqn: NonZeroU16,
    events: Vec<TrackEvent>,
    length_ticks: u64,
}

impl Track {
    /// Build a track, rejecting structurally invalid input up front.
    ///
    /// The length is the running tick sum over all events, so a trailing
    /// [`EventKind::EndOfTrack`] extends the track past its last note.
    pub fn new(
        name: impl Into<String>,
        ppqn: u16,
        events: Vec<TrackEvent>,
    ) -> Result<Self, TrackError> {
        let ppqn = NonZeroU16::new(ppqn).ok_or(TrackError::ZeroPpqn)?;
        let length_ticks = events.iter().map(|e| e.delta_ticks as u64).sum();
        if length_ticks == 0 {
            return Err(TrackError::ZeroLength);
        }

        Ok(Self {
            name: name.into(),
            ppqn,
            events,
            length_ticks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ppqn(&self) -> NonZeroU16 {
        self.ppqn
    }

    #[cfg(test)]
    pub fn events(&self) -> &[TrackEvent] {
        &self.events
    }

    pub fn length_ticks(&self) -> u64 {
        self.length_ticks
    }

    /// Iterate events paired with their cumulative tick position.
    pub fn positioned(&self) -> impl Iterator<Item = (u64, &TrackEvent)> + '_ {
        self.events.iter().scan(0u64, |ticks, event| {
            *ticks += event.delta_ticks as u64;
            Some((*ticks, event))
        })
    }
}
