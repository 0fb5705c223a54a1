//! Pattern playback state machine.
//!
//! Playback of a pattern is a chain of segments:
//!
//! ```text
//!   groove [0, G-F)  ──switch queued──▶  fill [0, F)       ──▶ next pattern
//!                    └─otherwise─────▶  remainder [G-F, G) ──▶ same pattern
//! ```
//!
//! where `G` is the groove length and `F` the bound fill's length. Without a
//! fill the groove plays whole and the pattern boundary follows directly.
//!
//! [`PlaybackState::step`] is a pure transition: it takes an [`Input`] and
//! returns the next state plus [`Effects`] (sends relative to the segment
//! start, the length of the segment to wait for, a status update). The
//! engine applies the effects against a real scheduler and output.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::clock::{Tempo, TickClock};
use crate::midi::{NOTE_OFF, NOTE_ON};
use crate::pattern::Song;
use crate::track::{EventKind, Track};

/// The region of a pattern currently sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Groove up to the pre-fill boundary (or whole, without a fill)
    Groove,
    /// The bound fill, played once before switching pattern
    Fill,
    /// Groove tail withheld for the fill, played when not switching
    Remainder,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no pattern named {0:?}")]
    UnknownPattern(String),

    #[error("pattern {0:?} has no grooves")]
    EmptyPattern(String),

    #[error("no pattern on pedal {0}")]
    UnknownPedal(usize),
}

/// Snapshot published on every request and segment transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub current: Option<String>,
    pub queued: Option<String>,
}

/// Something that drives the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Performer asked for a pattern
    Request(String),
    /// The armed segment ran to its end
    SegmentComplete,
    /// Return to idle immediately
    Stop,
}

/// A note message due `offset` after its segment starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSend {
    pub offset: Duration,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

/// Work the engine must carry out after a transition.
#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    /// Note messages of the segment that just started, in time order
    pub sends: Vec<ScheduledSend>,
    /// Length of the segment that just started; arm the continuation for it
    pub arm: Option<Duration>,
    /// Playback went idle; drop the outstanding continuation
    pub disarm: bool,
    pub status: Option<Status>,
    /// Why a request was ignored
    pub rejected: Option<PlaybackError>,
}

/// Everything the player knows about what is sounding.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    current_pattern: Option<String>,
    queued_pattern: Option<String>,
    segment: Option<Segment>,
    groove: Option<Arc<Track>>,
    fill: Option<Arc<Track>>,
    pre_fill_ticks: u64,
    groove_repeat_count: u64,
    fill_repeat_count: u64,
    tempo: Option<Tempo>,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_pattern(&self) -> Option<&str> {
        self.current_pattern.as_deref()
    }

    pub fn queued_pattern(&self) -> Option<&str> {
        self.queued_pattern.as_deref()
    }

    pub fn segment(&self) -> Option<Segment> {
        self.segment
    }

    pub fn is_idle(&self) -> bool {
        self.segment.is_none()
    }

    pub fn groove_track(&self) -> Option<&Arc<Track>> {
        self.groove.as_ref()
    }

    pub fn fill_track(&self) -> Option<&Arc<Track>> {
        self.fill.as_ref()
    }

    pub fn pre_fill_ticks(&self) -> u64 {
        self.pre_fill_ticks
    }

    pub fn groove_repeat_count(&self) -> u64 {
        self.groove_repeat_count
    }

    pub fn fill_repeat_count(&self) -> u64 {
        self.fill_repeat_count
    }

    pub fn tempo(&self) -> Option<Tempo> {
        self.tempo
    }

    pub fn status(&self) -> Status {
        Status {
            current: self.current_pattern.clone(),
            queued: self.queued_pattern.clone(),
        }
    }

    /// Apply one input and return the next state with the work to do.
    pub fn step<R: Rng>(mut self, song: &Song, input: Input, rng: &mut R) -> (Self, Effects) {
        let mut effects = Effects::default();
        match input {
            Input::Request(name) => self.request(song, name, rng, &mut effects),
            Input::SegmentComplete => self.segment_complete(song, rng, &mut effects),
            Input::Stop => self.stop(&mut effects),
        }
        (self, effects)
    }

    fn request<R: Rng>(&mut self, song: &Song, name: String, rng: &mut R, fx: &mut Effects) {
        match song.pattern(&name) {
            None => fx.rejected = Some(PlaybackError::UnknownPattern(name)),
            Some(pattern) if !pattern.is_playable() => {
                fx.rejected = Some(PlaybackError::EmptyPattern(name))
            }
            Some(_) => {
                if self.current_pattern.is_none() {
                    self.current_pattern = Some(name);
                    self.begin_pattern(song, rng, fx);
                } else if self.current_pattern.as_deref() == Some(name.as_str()) {
                    // Stay on this pattern
                    self.queued_pattern = None;
                } else {
                    self.queued_pattern = Some(name);
                }
            }
        }

        if let Some(err) = &fx.rejected {
            log::debug!("request ignored: {}", err);
        }
        fx.status = Some(self.status());
    }

    fn segment_complete<R: Rng>(&mut self, song: &Song, rng: &mut R, fx: &mut Effects) {
        match self.segment {
            // Stale continuation
            None => return,
            Some(Segment::Groove) => match self.fill.take() {
                None => self.pattern_boundary(song, rng, fx),
                Some(fill) if self.switch_pending() => self.play_fill(&fill, fx),
                Some(_) => self.play_remainder(fx),
            },
            Some(Segment::Fill) | Some(Segment::Remainder) => {
                self.pattern_boundary(song, rng, fx)
            }
        }
        fx.status = Some(self.status());
    }

    fn stop(&mut self, fx: &mut Effects) {
        self.go_idle();
        self.current_pattern = None;
        self.queued_pattern = None;
        self.groove_repeat_count = 0;
        self.fill_repeat_count = 0;
        fx.disarm = true;
        fx.status = Some(self.status());
    }

    fn switch_pending(&self) -> bool {
        self.queued_pattern.is_some() && self.queued_pattern != self.current_pattern
    }

    /// Start the current pattern from the top of a groove.
    fn begin_pattern<R: Rng>(&mut self, song: &Song, rng: &mut R, fx: &mut Effects) {
        let Some(pattern) = self.current_pattern.as_deref().and_then(|n| song.pattern(n)) else {
            self.go_idle();
            return;
        };
        if !pattern.is_playable() {
            self.go_idle();
            return;
        }

        let tempo = pattern.effective_tempo(song.tempo);

        let groove_idx =
            pattern
                .groove_mode
                .select(self.groove_repeat_count, pattern.grooves.len(), rng);
        let groove = Arc::clone(&pattern.grooves[groove_idx]);

        let fill = if pattern.fills.is_empty() {
            None
        } else {
            let fill_idx =
                pattern
                    .fill_mode
                    .select(self.fill_repeat_count, pattern.fills.len(), rng);
            Some(Arc::clone(&pattern.fills[fill_idx]))
        };

        self.pre_fill_ticks = match &fill {
            Some(fill) => {
                if fill.length_ticks() > groove.length_ticks() {
                    log::warn!(
                        "fill {:?} ({} ticks) is longer than groove {:?} ({} ticks), pre-fill region is empty",
                        fill.name(),
                        fill.length_ticks(),
                        groove.name(),
                        groove.length_ticks()
                    );
                }
                groove.length_ticks().saturating_sub(fill.length_ticks())
            }
            None => groove.length_ticks(),
        };

        log::info!(
            "pattern {:?}: groove {:?} at {:.1} bpm, fill {:?}",
            pattern.name,
            groove.name(),
            tempo.bpm(),
            fill.as_ref().map(|f| f.name())
        );

        fx.sends = render(&groove, 0..self.pre_fill_ticks, tempo);
        fx.arm = Some(TickClock::for_track(&groove, tempo).duration(self.pre_fill_ticks));

        self.tempo = Some(tempo);
        self.groove = Some(groove);
        self.fill = fill;
        self.segment = Some(Segment::Groove);
        self.groove_repeat_count += 1;
    }

    fn play_fill(&mut self, fill: &Arc<Track>, fx: &mut Effects) {
        let Some(tempo) = self.tempo else {
            self.go_idle();
            return;
        };

        log::debug!("fill {:?} before switching to {:?}", fill.name(), self.queued_pattern);
        fx.sends = render(fill, 0..fill.length_ticks(), tempo);
        fx.arm = Some(TickClock::for_track(fill, tempo).duration(fill.length_ticks()));
        self.fill_repeat_count += 1;
        self.segment = Some(Segment::Fill);
    }

    fn play_remainder(&mut self, fx: &mut Effects) {
        let (Some(groove), Some(tempo)) = (self.groove.clone(), self.tempo) else {
            self.go_idle();
            return;
        };

        let range = self.pre_fill_ticks..groove.length_ticks();
        fx.sends = render(&groove, range.clone(), tempo);
        fx.arm = Some(TickClock::for_track(&groove, tempo).duration(range.end - range.start));
        self.segment = Some(Segment::Remainder);
    }

    fn pattern_boundary<R: Rng>(&mut self, song: &Song, rng: &mut R, fx: &mut Effects) {
        if let Some(next) = self.queued_pattern.take() {
            log::info!("switching to pattern {:?}", next);
            self.current_pattern = Some(next);
            self.groove_repeat_count = 0;
            self.fill_repeat_count = 0;
        }

        if self.current_pattern.is_some() {
            self.begin_pattern(song, rng, fx);
        } else {
            self.go_idle();
        }

        if self.is_idle() {
            fx.disarm = true;
        }
    }

    fn go_idle(&mut self) {
        self.segment = None;
        self.groove = None;
        self.fill = None;
        self.pre_fill_ticks = 0;
        self.tempo = None;
    }
}

/// Note messages of `track` whose tick position lies in `range`, timed
/// relative to the start of the range.
///
/// The range is half-open. A note off sitting on the track's final tick is
/// never sent, and groove note offs in the tail withheld for a fill are
/// dropped when the fill plays. Drum voices ignore note off; sustained
/// patches can hang.
pub fn render(track: &Track, range: Range<u64>, tempo: Tempo) -> Vec<ScheduledSend> {
    let clock = TickClock::for_track(track, tempo);
    track
        .positioned()
        .filter(|(tick, _)| range.contains(tick))
        .filter_map(|(tick, event)| {
            let status = match event.kind {
                EventKind::NoteOn => NOTE_ON,
                EventKind::NoteOff => NOTE_OFF,
                EventKind::EndOfTrack => return None,
            };
            Some(ScheduledSend {
                offset: clock.duration(tick - range.start),
                status,
                data1: event.key,
                data2: event.velocity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Pattern, SelectionMode};
    use crate::track::TrackEvent;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// One note per beat, `beats` beats long at 96 ppqn.
    fn beats_track(name: &str, key: u8, beats: u32) -> Track {
        let mut events = Vec::new();
        for beat in 0..beats {
            let delta = if beat == 0 { 0 } else { 48 };
            events.push(TrackEvent::note_on(delta, key, 100));
            events.push(TrackEvent::note_off(48, key));
        }
        events.push(TrackEvent::end_of_track(48));
        Track::new(name, 96, events).unwrap()
    }

    fn song() -> Song {
        Song::new("test", Tempo::new(120.0).unwrap())
            .with_pattern(
                Pattern::new("A")
                    .with_groove(beats_track("a-groove", 36, 4))
                    .with_fill(beats_track("a-fill", 49, 1)),
            )
            .with_pattern(Pattern::new("B").with_groove(beats_track("b-groove", 38, 4)))
            .with_pattern(Pattern::new("Empty"))
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn run(state: PlaybackState, song: &Song, input: Input) -> (PlaybackState, Effects) {
        state.step(song, input, &mut rng())
    }

    fn request(name: &str) -> Input {
        Input::Request(name.to_string())
    }

    fn keys(effects: &Effects) -> Vec<u8> {
        effects
            .sends
            .iter()
            .filter(|s| s.status == NOTE_ON)
            .map(|s| s.data1)
            .collect()
    }

    #[test]
    fn test_request_from_idle_starts_groove() {
        let song = song();
        let (state, fx) = run(PlaybackState::new(), &song, request("B"));

        assert_eq!(state.current_pattern(), Some("B"));
        assert_eq!(state.segment(), Some(Segment::Groove));
        assert_eq!(state.groove_repeat_count(), 1);
        assert!(state.fill_track().is_none());
        assert_eq!(fx.arm, Some(Duration::from_secs(2)));
        assert_eq!(keys(&fx), vec![38, 38, 38, 38]);
        assert_eq!(
            fx.status,
            Some(Status {
                current: Some("B".to_string()),
                queued: None
            })
        );
    }

    #[test]
    fn test_unknown_and_empty_patterns_ignored() {
        let song = song();

        let (state, fx) = run(PlaybackState::new(), &song, request("Nope"));
        assert!(state.is_idle());
        assert_eq!(fx.rejected, Some(PlaybackError::UnknownPattern("Nope".to_string())));
        assert_eq!(fx.status, Some(Status::default()));
        assert!(fx.arm.is_none());

        let (state, fx) = run(state, &song, request("Empty"));
        assert!(state.is_idle());
        assert_eq!(fx.rejected, Some(PlaybackError::EmptyPattern("Empty".to_string())));
    }

    #[test]
    fn test_rejected_request_while_playing_keeps_state() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        let (state, _) = run(state, &song, request("B"));
        let (state, fx) = run(state, &song, request("Empty"));

        assert_eq!(state.current_pattern(), Some("A"));
        assert_eq!(state.queued_pattern(), Some("B"));
        assert!(fx.arm.is_none());
        assert!(fx.sends.is_empty());
    }

    #[test]
    fn test_groove_without_fill_repeats_forever() {
        let song = song();
        let (mut state, _) = run(PlaybackState::new(), &song, request("B"));

        for cycle in 2..10 {
            let (next, fx) = run(state, &song, Input::SegmentComplete);
            state = next;
            assert_eq!(state.segment(), Some(Segment::Groove));
            assert_eq!(state.groove_repeat_count(), cycle);
            assert!(state.fill_track().is_none());
            assert_eq!(fx.arm, Some(Duration::from_secs(2)));
            assert_eq!(keys(&fx), vec![38, 38, 38, 38]);
        }
    }

    #[test]
    fn test_pre_fill_region_withholds_fill_length() {
        let song = song();
        let (state, fx) = run(PlaybackState::new(), &song, request("A"));

        // Groove 384 ticks, fill 96 ticks
        assert_eq!(state.pre_fill_ticks(), 288);
        assert_eq!(fx.arm, Some(Duration::from_millis(1500)));
        assert_eq!(keys(&fx), vec![36, 36, 36]);
        assert!(state.fill_track().is_some());
    }

    #[test]
    fn test_switch_plays_fill_then_next_pattern() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        let (state, fx) = run(state, &song, request("B"));
        assert_eq!(fx.status.as_ref().and_then(|s| s.queued.clone()), Some("B".to_string()));
        assert!(fx.arm.is_none());

        // Pre-fill boundary: whole fill, never the remainder
        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(state.segment(), Some(Segment::Fill));
        assert_eq!(state.fill_repeat_count(), 1);
        assert_eq!(keys(&fx), vec![49]);
        assert_eq!(fx.arm, Some(Duration::from_millis(500)));
        assert_eq!(fx.sends[0].offset, Duration::ZERO);

        // Fill done: adopt B with fresh counters
        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(state.current_pattern(), Some("B"));
        assert_eq!(state.queued_pattern(), None);
        assert_eq!(state.segment(), Some(Segment::Groove));
        assert_eq!(state.groove_repeat_count(), 1);
        assert_eq!(state.fill_repeat_count(), 0);
        assert_eq!(keys(&fx), vec![38, 38, 38, 38]);
        assert_eq!(
            fx.status,
            Some(Status {
                current: Some("B".to_string()),
                queued: None
            })
        );
    }

    #[test]
    fn test_switch_without_fill_goes_straight_to_next_pattern() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("B"));
        assert!(state.fill_track().is_none());
        let (state, _) = run(state, &song, request("A"));
        assert_eq!(state.queued_pattern(), Some("A"));

        // Whole groove played, no fill to offer: A starts with fresh counters
        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(state.current_pattern(), Some("A"));
        assert_eq!(state.queued_pattern(), None);
        assert_eq!(state.segment(), Some(Segment::Groove));
        assert_eq!(state.groove_repeat_count(), 1);
        assert_eq!(state.fill_repeat_count(), 0);
        assert_eq!(keys(&fx), vec![36, 36, 36]);
        assert!(!fx.disarm);
    }

    #[test]
    fn test_staying_plays_remainder() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        let (state, _) = run(state, &song, request("B"));
        // Changed our mind: stay on A
        let (state, fx) = run(state, &song, request("A"));
        assert_eq!(state.queued_pattern(), None);
        assert!(fx.arm.is_none());

        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(state.segment(), Some(Segment::Remainder));
        assert!(state.fill_track().is_none(), "fill offer consumed");
        assert_eq!(state.fill_repeat_count(), 0);
        assert_eq!(keys(&fx), vec![36]);
        assert_eq!(fx.arm, Some(Duration::from_millis(500)));
        // Remainder is timed from its own start, tick 288
        assert_eq!(fx.sends[0].offset, Duration::ZERO);

        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(state.current_pattern(), Some("A"));
        assert_eq!(state.segment(), Some(Segment::Groove));
        assert_eq!(state.groove_repeat_count(), 2);
        assert_eq!(keys(&fx), vec![36, 36, 36]);
    }

    #[test]
    fn test_same_pattern_request_is_idempotent() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        let before = state.status();
        let repeats = state.groove_repeat_count();
        let segment = state.segment();

        let (state, fx) = run(state, &song, request("A"));
        assert_eq!(fx.status, Some(before));
        assert_eq!(state.groove_repeat_count(), repeats);
        assert_eq!(state.segment(), segment);
        assert!(fx.sends.is_empty());
        assert!(fx.arm.is_none());
        assert!(!fx.disarm);
    }

    #[test]
    fn test_later_request_replaces_queue() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        let (state, _) = run(state, &song, request("B"));
        let song = song.with_pattern(Pattern::new("C").with_groove(beats_track("c", 40, 4)));
        let (state, _) = run(state, &song, request("C"));
        assert_eq!(state.queued_pattern(), Some("C"));
    }

    #[test]
    fn test_sequence_mode_cycles_grooves() {
        let song = Song::default().with_pattern(
            Pattern::new("Multi")
                .with_groove(beats_track("g0", 40, 1))
                .with_groove(beats_track("g1", 41, 1))
                .with_groove(beats_track("g2", 42, 1)),
        );

        let (mut state, fx) = run(PlaybackState::new(), &song, request("Multi"));
        let mut played = keys(&fx);
        for _ in 0..6 {
            let (next, fx) = run(state, &song, Input::SegmentComplete);
            state = next;
            played.extend(keys(&fx));
        }
        assert_eq!(played, vec![40, 41, 42, 40, 41, 42, 40]);
    }

    #[test]
    fn test_sequence_mode_cycles_fills() {
        let song = Song::default()
            .with_pattern(
                Pattern::new("A")
                    .with_groove(beats_track("a", 36, 4))
                    .with_fill(beats_track("f0", 50, 1))
                    .with_fill(beats_track("f1", 51, 1)),
            )
            .with_pattern(Pattern::new("B").with_groove(beats_track("b", 38, 4)));

        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        assert_eq!(state.fill_track().map(|t| t.name().to_string()), Some("f0".to_string()));
        let (state, _) = run(state, &song, request("B"));
        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(keys(&fx), vec![50]);
        assert_eq!(state.fill_repeat_count(), 1);
    }

    #[test]
    fn test_random_mode_picks_existing_groove() {
        let mut pattern = Pattern::new("R")
            .with_groove(beats_track("g0", 40, 1))
            .with_groove(beats_track("g1", 41, 1));
        pattern.groove_mode = SelectionMode::Random;
        let song = Song::default().with_pattern(pattern);

        let mut rng = StdRng::seed_from_u64(3);
        let (mut state, _) = PlaybackState::new().step(&song, request("R"), &mut rng);
        for _ in 0..20 {
            let (next, fx) = state.step(&song, Input::SegmentComplete, &mut rng);
            state = next;
            let played = keys(&fx);
            assert!(played == vec![40] || played == vec![41], "played {:?}", played);
        }
    }

    #[test]
    fn test_fill_longer_than_groove_clamps() {
        let song = Song::default()
            .with_pattern(
                Pattern::new("Short")
                    .with_groove(beats_track("g", 36, 1))
                    .with_fill(beats_track("f", 49, 2)),
            )
            .with_pattern(Pattern::new("B").with_groove(beats_track("b", 38, 1)));

        let (state, fx) = run(PlaybackState::new(), &song, request("Short"));
        assert_eq!(state.pre_fill_ticks(), 0);
        assert_eq!(fx.arm, Some(Duration::ZERO));
        assert!(fx.sends.is_empty());

        // Not switching: the whole groove plays as remainder
        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert_eq!(state.segment(), Some(Segment::Remainder));
        assert_eq!(keys(&fx), vec![36]);
    }

    #[test]
    fn test_tempo_override_applies() {
        let mut pattern = Pattern::new("Slow").with_groove(beats_track("g", 36, 4));
        pattern.tempo_override = Some(Tempo::new(60.0).unwrap());
        let song = Song::default().with_pattern(pattern);

        let (state, fx) = run(PlaybackState::new(), &song, request("Slow"));
        assert_eq!(state.tempo().map(Tempo::bpm), Some(60.0));
        assert_eq!(fx.arm, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let song = song();
        let (state, _) = run(PlaybackState::new(), &song, request("A"));
        let (state, _) = run(state, &song, request("B"));
        let (state, fx) = run(state, &song, Input::Stop);

        assert!(state.is_idle());
        assert_eq!(state.current_pattern(), None);
        assert_eq!(state.queued_pattern(), None);
        assert_eq!(state.groove_repeat_count(), 0);
        assert!(fx.disarm);
        assert_eq!(fx.status, Some(Status::default()));

        // A continuation armed before the stop is a no-op
        let (state, fx) = run(state, &song, Input::SegmentComplete);
        assert!(state.is_idle());
        assert_eq!(fx, Effects::default());
    }

    #[test]
    fn test_render_half_open_range() {
        let track = beats_track("t", 36, 4);
        let tempo = Tempo::new(120.0).unwrap();

        // Note-on at 96, note-off at 144; 192 is excluded
        let sends = render(&track, 96..192, tempo);
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].status, NOTE_ON);
        assert_eq!(sends[0].offset, Duration::ZERO);
        assert_eq!(sends[1].status, NOTE_OFF);
        assert_eq!(sends[1].offset, Duration::from_millis(250));
    }

    #[test]
    fn test_render_skips_note_off_on_final_tick() {
        // Note off shares the end-of-track tick
        let track = Track::new(
            "tied",
            96,
            vec![
                TrackEvent::note_on(0, 36, 100),
                TrackEvent::note_off(384, 36),
                TrackEvent::end_of_track(0),
            ],
        )
        .unwrap();

        let sends = render(&track, 0..track.length_ticks(), Tempo::DEFAULT);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].status, NOTE_ON);
    }

    #[test]
    fn test_render_is_time_ordered() {
        let track = beats_track("t", 36, 4);
        let sends = render(&track, 0..384, Tempo::new(97.0).unwrap());
        assert_eq!(sends.len(), 8);
        assert!(sends.windows(2).all(|w| w[0].offset <= w[1].offset));
    }

    #[test]
    fn test_render_never_sends_end_of_track() {
        let track = Track::new("marker", 96, vec![TrackEvent::end_of_track(96)]).unwrap();
        assert!(render(&track, 0..200, Tempo::DEFAULT).is_empty());
    }
}
