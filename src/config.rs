//! Player configuration and song manifests.
//!
//! Both are YAML files. The player config names the MIDI devices and the
//! song to load; the song manifest lists patterns and the MIDI files that
//! make up their grooves and fills.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::clock::Tempo;
use crate::import::track_from_file;
use crate::midi::DEFAULT_TRIGGER_BASE_NOTE;
use crate::pattern::{Pattern, SelectionMode, Song};
use crate::track::Track;

/// Device and song settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// MIDI output device name (substring match)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    /// MIDI input device the pedals are on (substring match)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// MIDI output channel (1-16, stored as 1-indexed for human readability)
    #[serde(default = "default_channel")]
    pub output_channel: u8,
    /// Pedal `n` sends note `trigger_base_note + n`
    #[serde(default = "default_trigger_base_note")]
    pub trigger_base_note: u8,
    /// Song manifest, relative to the config file or absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song: Option<PathBuf>,
}

fn default_channel() -> u8 {
    1 // 1-indexed for YAML readability
}

fn default_trigger_base_note() -> u8 {
    DEFAULT_TRIGGER_BASE_NOTE
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            input_device: None,
            output_channel: default_channel(),
            trigger_base_note: default_trigger_base_note(),
            song: None,
        }
    }
}

impl PlayerConfig {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        let project_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        project_dir.join("groove_pedal.yaml")
    }

    /// Load configuration from a YAML file. A missing file gives defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config YAML {}", path.display()))?;
        if !(1..=16).contains(&config.output_channel) {
            bail!("output_channel must be 1-16, got {}", config.output_channel);
        }
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self).context("failed to serialize config")?;

        fs::write(path.as_ref(), content)
            .with_context(|| format!("failed to write config file {}", path.as_ref().display()))
    }

    /// Output channel as a 0-15 nibble.
    pub fn channel_nibble(&self) -> u8 {
        self.output_channel.clamp(1, 16) - 1
    }

    /// Song manifest path, resolved against the config file's directory.
    pub fn song_path(&self, config_path: &Path) -> Option<PathBuf> {
        let song = self.song.as_ref()?;
        Some(resolve(config_path, song))
    }
}

/// One pattern entry in a song manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternManifest {
    pub name: String,
    /// 0 inherits the song tempo
    #[serde(default)]
    pub tempo: f64,
    #[serde(default)]
    pub grooves_mode: SelectionMode,
    #[serde(default)]
    pub fills_mode: SelectionMode,
    #[serde(default)]
    pub grooves: Vec<PathBuf>,
    #[serde(default)]
    pub fills: Vec<PathBuf>,
}

/// A song as written on disk. Pattern order is pedal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongManifest {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default)]
    pub patterns: Vec<PatternManifest>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_tempo() -> f64 {
    Tempo::DEFAULT.bpm()
}

impl SongManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read song {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse song YAML {}", path.display()))
    }

    /// Build a song, loading track files relative to `base_dir`.
    pub fn into_song(self, base_dir: &Path) -> anyhow::Result<Song> {
        self.build(|path| track_from_file(base_dir.join(path)))
    }

    /// Build a song with a custom track loader.
    pub fn build<F>(self, mut load_track: F) -> anyhow::Result<Song>
    where
        F: FnMut(&Path) -> anyhow::Result<Track>,
    {
        let tempo = Tempo::new(self.tempo).context("invalid song tempo")?;
        let mut song = Song::new(self.title, tempo);
        let mut seen = HashSet::new();

        for entry in self.patterns {
            if !seen.insert(entry.name.clone()) {
                bail!("duplicate pattern name {:?}", entry.name);
            }

            let tempo_override = if entry.tempo == 0.0 {
                None
            } else {
                let tempo = Tempo::new(entry.tempo)
                    .with_context(|| format!("invalid tempo for pattern {:?}", entry.name))?;
                Some(tempo)
            };

            let mut pattern = Pattern::new(entry.name);
            pattern.tempo_override = tempo_override;
            pattern.groove_mode = entry.grooves_mode;
            pattern.fill_mode = entry.fills_mode;
            for path in &entry.grooves {
                pattern = pattern.with_groove(load_track(path)?);
            }
            for path in &entry.fills {
                pattern = pattern.with_fill(load_track(path)?);
            }

            if !pattern.is_playable() {
                log::warn!("pattern {:?} has no grooves and cannot be played", pattern.name);
            }
            song.add_pattern(pattern);
        }

        Ok(song)
    }
}

/// Load the song a manifest path points at.
pub fn load_song(path: &Path) -> anyhow::Result<Song> {
    let manifest = SongManifest::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.into_song(base_dir)
}

fn resolve(relative_to: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    relative_to
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(path)
}
