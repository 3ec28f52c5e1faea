//! Mod settings — the read-only configuration the pipeline is driven by.
//!
//! Settings are owned by the host (the game mod's settings UI writes them).
//! The core never mutates them: components hold a [`SettingsHandle`] and take
//! a [`Settings`] snapshot at the moment a request is made, so a settings
//! change only affects speech requested afterwards.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::voice::VoiceRole;

/// Accepted range for pitch and rate settings.
pub const PITCH_RATE_RANGE: std::ops::RangeInclusive<i32> = -10..=10;

/// Accepted range for volume settings.
pub const VOLUME_RANGE: std::ops::RangeInclusive<i32> = 0..=100;

/// Voice used whenever the configured selection cannot be resolved.
pub const DEFAULT_VOICE: &str = "en-IE-EmilyNeural";

/// Which synthesis backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Pick the platform default (edge-tts on Windows, say on macOS,
    /// espeak-ng elsewhere).
    #[default]
    Auto,
    EdgeTts,
    EspeakNg,
    Say,
}

// ─────────────────────────────────────────────────────────────────────────────
// settings.json schema
// ─────────────────────────────────────────────────────────────────────────────

/// Deserialised settings. Every field has a default so a partial (or empty)
/// JSON object is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Index into [`available_voices`](Self::available_voices).
    pub narrator_voice: usize,
    pub female_voice: usize,
    pub male_voice: usize,

    /// `"voiceId#gender"` entries, normally filled from the backend at start-up.
    pub available_voices: Vec<String>,

    /// Fallback voice id for the built-in default profile.
    pub default_voice: String,

    pub narrator_pitch: i32,
    pub narrator_rate: i32,
    pub narrator_volume: i32,
    pub female_pitch: i32,
    pub female_rate: i32,
    pub female_volume: i32,
    pub male_pitch: i32,
    pub male_rate: i32,
    pub male_volume: i32,

    /// Route dialog through the per-gender voices.
    pub use_gender_specific_voices: bool,

    /// New speech cancels whatever is queued or playing.
    pub interrupt_playback_on_play: bool,

    /// Voice previews from the settings screen cancel prior speech.
    pub preview_interrupts: bool,

    /// Upper bound (in characters) for one synthesis call.
    pub max_chunk_chars: usize,

    /// Number of chunks synthesised concurrently.
    pub synthesis_parallelism: usize,

    pub synthesis_timeout_ms: u64,
    pub playback_timeout_ms: u64,

    /// Directory for transient audio artifacts.
    pub work_dir: Option<PathBuf>,

    pub backend: BackendKind,

    /// Override for the synthesis executable (path or name on `$PATH`).
    pub synthesizer_program: Option<String>,

    /// Override for the playback executable.
    pub player_program: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            narrator_voice: 0,
            female_voice: 0,
            male_voice: 0,
            available_voices: Vec::new(),
            default_voice: DEFAULT_VOICE.to_string(),
            narrator_pitch: 0,
            narrator_rate: 0,
            narrator_volume: 100,
            female_pitch: 0,
            female_rate: 0,
            female_volume: 100,
            male_pitch: 0,
            male_rate: 0,
            male_volume: 100,
            use_gender_specific_voices: true,
            interrupt_playback_on_play: true,
            preview_interrupts: false,
            max_chunk_chars: 400,
            synthesis_parallelism: 2,
            synthesis_timeout_ms: 30_000,
            playback_timeout_ms: 300_000,
            work_dir: None,
            backend: BackendKind::Auto,
            synthesizer_program: None,
            player_program: None,
        }
    }
}

/// Pitch, rate and volume for one role, already clamped to their ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acoustics {
    pub pitch: i32,
    pub rate: i32,
    pub volume: i32,
}

impl Settings {
    /// Parse settings from a JSON string.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read settings: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Selected voice index for `role`.
    pub fn voice_index(&self, role: VoiceRole) -> usize {
        match role {
            VoiceRole::Narrator => self.narrator_voice,
            VoiceRole::Female => self.female_voice,
            VoiceRole::Male => self.male_voice,
        }
    }

    /// Acoustic parameters for `role`, clamped to the accepted ranges.
    pub fn acoustics(&self, role: VoiceRole) -> Acoustics {
        let (pitch, rate, volume) = match role {
            VoiceRole::Narrator => (self.narrator_pitch, self.narrator_rate, self.narrator_volume),
            VoiceRole::Female => (self.female_pitch, self.female_rate, self.female_volume),
            VoiceRole::Male => (self.male_pitch, self.male_rate, self.male_volume),
        };
        Acoustics {
            pitch: pitch.clamp(*PITCH_RATE_RANGE.start(), *PITCH_RATE_RANGE.end()),
            rate: rate.clamp(*PITCH_RATE_RANGE.start(), *PITCH_RATE_RANGE.end()),
            volume: volume.clamp(*VOLUME_RANGE.start(), *VOLUME_RANGE.end()),
        }
    }

    /// Artifact directory, defaulting to `$TMPDIR/speechmod`.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("speechmod"))
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms.max(1))
    }

    pub fn playback_timeout(&self) -> Duration {
        Duration::from_millis(self.playback_timeout_ms.max(1))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cheaply clonable handle to the host-owned settings.
///
/// The pipeline only ever calls [`snapshot`](Self::snapshot); the host side
/// (FFI / HTTP) calls [`replace`](Self::replace) when the user saves settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self { inner: Arc::new(RwLock::new(settings)) }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Swap in a new settings object.
    pub fn replace(&self, settings: Settings) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = settings;
    }

    /// Fill `available_voices` if the settings do not carry any yet.
    /// Returns `true` when the list was updated.
    pub(crate) fn seed_voices(&self, voices: Vec<String>) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if guard.available_voices.is_empty() && !voices.is_empty() {
            guard.available_voices = voices;
            true
        } else {
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
