//! The player context.
//!
//! [`Player`] owns the song, the playback state, the scheduler, the output
//! sink and the status channel. It feeds requests and segment completions
//! through [`PlaybackState::step`] and carries out the resulting effects.
//!
//! # Thread Safety
//! Requests arrive on the MIDI input thread or the GUI thread; segment
//! completions arrive on the scheduler thread. Both go through one mutex, so
//! each transition runs to completion before the next one starts.
//!
//! # Timing
//! Each segment starts at the previous segment's intended deadline, not at
//! the moment the continuation woke up, so scheduler lateness does not
//! accumulate from one segment to the next.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::midi::{OutputSink, NOTE_OFF, NOTE_ON};
use crate::pattern::Song;
use crate::playback::{Effects, Input, PlaybackError, PlaybackState, Status};
use crate::scheduler::{Scheduler, TimerHandle};

/// How long an auditioned note is held.
pub const AUDITION_NOTE_LENGTH: Duration = Duration::from_millis(500);

/// The continuation currently armed for the end of a segment.
struct Armed {
    handle: TimerHandle,
    seq: u64,
}

struct Engine {
    song: Song,
    state: PlaybackState,
    /// Bumped whenever the song is replaced or playback stops
    generation: u64,
    /// Bumped on every arm
    arm_seq: u64,
    armed: Option<Armed>,
    scheduler: Arc<dyn Scheduler>,
    output: Option<Box<dyn OutputSink>>,
    status_tx: Sender<Status>,
    rng: StdRng,
    this: Weak<Mutex<Engine>>,
}

/// Cheaply cloneable handle to a running player.
#[derive(Clone)]
pub struct Player {
    engine: Arc<Mutex<Engine>>,
}

impl Player {
    pub fn new(song: Song, scheduler: Arc<dyn Scheduler>, status_tx: Sender<Status>) -> Self {
        Self::with_rng(song, scheduler, status_tx, StdRng::from_entropy())
    }

    /// Player with a fixed random source, for reproducible Random mode.
    pub fn with_rng(
        song: Song,
        scheduler: Arc<dyn Scheduler>,
        status_tx: Sender<Status>,
        rng: StdRng,
    ) -> Self {
        let engine = Arc::new_cyclic(|this| {
            Mutex::new(Engine {
                song,
                state: PlaybackState::new(),
                generation: 0,
                arm_seq: 0,
                armed: None,
                scheduler,
                output: None,
                status_tx,
                rng,
                this: this.clone(),
            })
        });
        Self { engine }
    }

    /// Ask for a pattern by name. Rejected requests leave playback untouched.
    pub fn request_pattern(&self, name: &str) -> Result<(), PlaybackError> {
        let mut engine = self.engine.lock();
        match engine.apply(Input::Request(name.to_string()), Instant::now()) {
            Some(rejected) => Err(rejected),
            None => Ok(()),
        }
    }

    /// Ask for the pattern on a 1-based pedal.
    pub fn request_pedal(&self, pedal: usize) -> Result<(), PlaybackError> {
        let name = {
            let engine = self.engine.lock();
            engine.song.pattern_for_pedal(pedal).map(|p| p.name.clone())
        };
        match name {
            Some(name) => self.request_pattern(&name),
            None => {
                let engine = self.engine.lock();
                engine.publish(engine.state.status());
                Err(PlaybackError::UnknownPedal(pedal))
            }
        }
    }

    pub fn stop(&self) {
        let mut engine = self.engine.lock();
        engine.apply(Input::Stop, Instant::now());
        engine.generation += 1;
    }

    /// Replace the song. Whatever was playing stops and its continuation
    /// becomes stale.
    pub fn set_song(&self, song: Song) {
        let mut engine = self.engine.lock();
        engine.disarm();
        engine.generation += 1;
        if let Some(output) = engine.output.as_mut() {
            output.cancel_pending();
        }
        engine.song = song;
        engine.state = PlaybackState::new();
        engine.publish(engine.state.status());
        log::info!("song loaded: {:?}", engine.song.title);
    }

    pub fn attach_output(&self, output: Box<dyn OutputSink>) {
        self.engine.lock().output = Some(output);
    }

    #[cfg(test)]
    fn detach_output(&self) -> Option<Box<dyn OutputSink>> {
        self.engine.lock().output.take()
    }

    /// Play a single note now, outside of any pattern.
    pub fn audition(&self, key: u8) {
        let mut engine = self.engine.lock();
        let now = Instant::now();
        match engine.output.as_mut() {
            Some(output) => {
                output.send(NOTE_ON, key, 127, Some(now));
                output.send(NOTE_OFF, key, 0, Some(now + AUDITION_NOTE_LENGTH));
            }
            None => log::warn!("no MIDI output, audition of note {} dropped", key),
        }
    }

    pub fn status(&self) -> Status {
        self.engine.lock().state.status()
    }

    pub fn song_title(&self) -> String {
        self.engine.lock().song.title.clone()
    }

    /// Run `f` against the current song.
    pub fn with_song<T>(&self, f: impl FnOnce(&Song) -> T) -> T {
        f(&self.engine.lock().song)
    }

    #[cfg(test)]
    fn with_state<T>(&self, f: impl FnOnce(&PlaybackState) -> T) -> T {
        f(&self.engine.lock().state)
    }
}

impl Engine {
    /// Run one transition. `segment_start` is when any segment it begins
    /// starts sounding. Returns the rejection, if the input was a rejected
    /// request.
    fn apply(&mut self, input: Input, segment_start: Instant) -> Option<PlaybackError> {
        let state = std::mem::take(&mut self.state);
        let (state, fx) = state.step(&self.song, input, &mut self.rng);
        self.state = state;
        self.carry_out(fx, segment_start)
    }

    fn carry_out(&mut self, fx: Effects, segment_start: Instant) -> Option<PlaybackError> {
        let Effects {
            sends,
            arm,
            disarm,
            status,
            rejected,
        } = fx;

        if disarm {
            self.disarm();
            if let Some(output) = self.output.as_mut() {
                output.cancel_pending();
            }
        }

        match self.output.as_mut() {
            Some(output) => {
                for send in &sends {
                    output.send(send.status, send.data1, send.data2, Some(segment_start + send.offset));
                }
            }
            None if !sends.is_empty() => {
                log::warn!("no MIDI output, dropped {} messages", sends.len());
            }
            None => {}
        }

        if let Some(length) = arm {
            self.arm(segment_start + length);
        }

        if let Some(status) = status {
            self.publish(status);
        }

        rejected
    }

    /// Arm the end-of-segment continuation, replacing any previous one.
    fn arm(&mut self, deadline: Instant) {
        self.disarm();

        self.arm_seq += 1;
        let this = self.this.clone();
        let (generation, seq) = (self.generation, self.arm_seq);
        let delay = deadline.saturating_duration_since(Instant::now());
        let state = &self.state;
        log::debug!(
            "{:?} of {:?} at {:.1} bpm ends in {:?} (groove #{}, fill #{}, pre-fill {} ticks)",
            state.segment(),
            state.current_pattern().unwrap_or("-"),
            state.tempo().map_or(0.0, |t| t.bpm()),
            delay,
            state.groove_repeat_count(),
            state.fill_repeat_count(),
            state.pre_fill_ticks(),
        );
        log::trace!(
            "groove {:?}, fill {:?}",
            state.groove_track().map(|t| t.name()),
            state.fill_track().map(|t| t.name()),
        );

        let handle = self.scheduler.after(
            delay,
            Box::new(move || {
                if let Some(engine) = this.upgrade() {
                    engine.lock().segment_complete(generation, seq, deadline);
                }
            }),
        );
        self.armed = Some(Armed { handle, seq });
    }

    fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            self.scheduler.cancel(armed.handle);
        }
    }

    fn segment_complete(&mut self, generation: u64, seq: u64, deadline: Instant) {
        // Song swapped, stopped, or re-armed since this continuation was armed
        let current = self.armed.as_ref().map(|a| a.seq);
        if generation != self.generation || current != Some(seq) {
            log::debug!("ignoring stale segment continuation");
            return;
        }
        self.armed = None;
        self.apply(Input::SegmentComplete, deadline);
    }

    fn publish(&self, status: Status) {
        // Nobody listening is fine
        let _ = self.status_tx.try_send(status);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.disarm();
        if let Some(output) = self.output.as_mut() {
            output.cancel_pending();
        }
    }
}
