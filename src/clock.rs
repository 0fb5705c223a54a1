//! Tick to wall-clock conversion.
//!
//! Track positions are measured in ticks relative to the track's PPQN. Under
//! a tempo in beats per minute one tick lasts `60000 / (ppqn * bpm)` ms.

use std::num::NonZeroU16;
use std::time::Duration;

use thiserror::Error;

use crate::track::Track;

/// Upper tempo bound accepted from song manifests.
pub const MAX_BPM: f64 = 10_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum ClockError {
    #[error("ticks per quarter note must be greater than zero")]
    InvalidPpqn,

    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f64),
}

/// A validated tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo(f64);

impl Tempo {
    pub const DEFAULT: Tempo = Tempo(120.0);

    pub fn new(bpm: f64) -> Result<Self, ClockError> {
        if bpm.is_finite() && bpm > 0.0 && bpm < MAX_BPM {
            Ok(Self(bpm))
        } else {
            Err(ClockError::InvalidTempo(bpm))
        }
    }

    pub fn bpm(self) -> f64 {
        self.0
    }
}

/// Milliseconds per tick for the given resolution and tempo.
pub fn ms_per_tick(ppqn: u16, bpm: f64) -> Result<f64, ClockError> {
    TickClock::new(ppqn, bpm).map(|clock| clock.ms_per_tick())
}

/// Converts tick counts of one track into durations at a fixed tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickClock {
    ppqn: NonZeroU16,
    tempo: Tempo,
}

impl TickClock {
    pub fn new(ppqn: u16, bpm: f64) -> Result<Self, ClockError> {
        let ppqn = NonZeroU16::new(ppqn).ok_or(ClockError::InvalidPpqn)?;
        let tempo = Tempo::new(bpm)?;
        Ok(Self { ppqn, tempo })
    }

    /// Clock for a track that has already been validated at construction.
    pub fn for_track(track: &Track, tempo: Tempo) -> Self {
        Self {
            ppqn: track.ppqn(),
            tempo,
        }
    }

    pub fn ms_per_tick(&self) -> f64 {
        60_000.0 / (self.ppqn.get() as f64 * self.tempo.bpm())
    }

    /// Duration of `ticks` ticks.
    ///
    /// Computed in one division rather than `ticks * ms_per_tick` so whole
    /// bars come out exact.
    pub fn duration(&self, ticks: u64) -> Duration {
        let secs = ticks as f64 * 60.0 / (self.ppqn.get() as f64 * self.tempo.bpm());
        Duration::from_secs_f64(secs)
    }
}
