//! Songs and their patterns.
//!
//! A [`Song`] is an ordered list of [`Pattern`]s. Order matters only for
//! pedal triggers: pedal 1 selects the first pattern, pedal 2 the second,
//! and so on.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::Tempo;
use crate::track::Track;

/// How the next groove or fill is picked each time a pattern starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Cycle through variants in order
    #[default]
    Sequence,
    /// Pick uniformly at random
    Random,
}

impl SelectionMode {
    /// Choose a variant index out of `count` (which must be non-zero).
    pub fn select(self, repeat_count: u64, count: usize, rng: &mut impl Rng) -> usize {
        match self {
            SelectionMode::Sequence => (repeat_count % count as u64) as usize,
            SelectionMode::Random => rng.gen_range(0..count),
        }
    }
}

/// A named set of groove and fill variants.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    /// `None` inherits the song tempo
    pub tempo_override: Option<Tempo>,
    pub groove_mode: SelectionMode,
    pub fill_mode: SelectionMode,
    pub grooves: Vec<Arc<Track>>,
    pub fills: Vec<Arc<Track>>,
}

impl Pattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tempo_override: None,
            groove_mode: SelectionMode::Sequence,
            fill_mode: SelectionMode::Sequence,
            grooves: Vec::new(),
            fills: Vec::new(),
        }
    }

    pub fn with_groove(mut self, track: Track) -> Self {
        self.grooves.push(Arc::new(track));
        self
    }

    pub fn with_fill(mut self, track: Track) -> Self {
        self.fills.push(Arc::new(track));
        self
    }

    pub fn is_playable(&self) -> bool {
        !self.grooves.is_empty()
    }

    pub fn effective_tempo(&self, song_tempo: Tempo) -> Tempo {
        self.tempo_override.unwrap_or(song_tempo)
    }
}

/// The song being performed. Read-only to the player.
#[derive(Debug, Clone)]
pub struct Song {
    pub title: String,
    pub tempo: Tempo,
    patterns: Vec<Pattern>,
}

impl Song {
    pub fn new(title: impl Into<String>, tempo: Tempo) -> Self {
        Self {
            title: title.into(),
            tempo,
            patterns: Vec::new(),
        }
    }

    /// Append a pattern. A pattern with an existing name replaces it in place.
    pub fn add_pattern(&mut self, pattern: Pattern) {
        match self.patterns.iter_mut().find(|p| p.name == pattern.name) {
            Some(existing) => *existing = pattern,
            None => self.patterns.push(pattern),
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.add_pattern(pattern);
        self
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern(&self, name: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.name == name)
    }

    /// Pattern selected by a 1-based pedal number.
    pub fn pattern_for_pedal(&self, pedal: usize) -> Option<&Pattern> {
        pedal.checked_sub(1).and_then(|idx| self.patterns.get(idx))
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::new("Untitled", Tempo::DEFAULT)
    }
}
