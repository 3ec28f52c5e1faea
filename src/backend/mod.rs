//! Synthesis backends — external executables that turn a chunk of text into
//! an audio file, plus the player that renders that file.
//!
//! A backend never runs anything itself: it builds [`Command`]s and parses
//! voice listings. Spawning, cancellation and timeouts live in [`process`],
//! shared by every backend.

pub mod edge;
pub mod espeak;
#[cfg(all(test, unix))]
pub(crate) mod fake;
pub mod process;
pub mod say;

use std::{fmt, path::Path, sync::Arc, time::Duration};

use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    config::{BackendKind, Settings},
    error::{Result, SpeechError},
    voice::{VoiceEntry, VoiceProfile},
};

pub use edge::EdgeTts;
pub use espeak::EspeakNg;
pub use process::{executable_in_path, validate_artifact, ProcessOutcome};
pub use say::Say;

/// Deadline for a voice-listing query.
pub const VOICE_LIST_TIMEOUT: Duration = Duration::from_secs(20);

/// One text-to-speech engine plus its audio player.
pub trait SpeechBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Extension (without dot) of the files [`synthesis_command`] writes.
    ///
    /// [`synthesis_command`]: Self::synthesis_command
    fn artifact_extension(&self) -> &'static str;

    /// Command that renders `text` with `profile` into `output`.
    fn synthesis_command(&self, text: &str, profile: &VoiceProfile, output: &Path) -> Command;

    /// Command that plays `artifact` to completion.
    fn playback_command(&self, artifact: &Path) -> Command;

    /// Command whose stdout lists the installed voices.
    fn list_voices_command(&self) -> Command;

    /// Parse the output of [`list_voices_command`](Self::list_voices_command).
    fn parse_voices(&self, output: &str) -> Vec<VoiceEntry>;
}

/// Query the backend for its voices.
pub async fn list_voices(backend: &dyn SpeechBackend) -> anyhow::Result<Vec<VoiceEntry>> {
    let stdout = process::capture_stdout(backend.list_voices_command(), VOICE_LIST_TIMEOUT).await?;
    Ok(backend.parse_voices(&stdout))
}

// ─────────────────────────────────────────────────────────────────────────────
// Player
// ─────────────────────────────────────────────────────────────────────────────

/// Audio player executable with the flags it needs to play one file quietly
/// and exit when done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub program: String,
    pub args: Vec<String>,
}

impl Player {
    /// Player for `program`, with flags picked from its file stem.
    pub fn for_program(program: impl Into<String>) -> Self {
        let program = program.into();
        let stem = Path::new(&program)
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let args: &[&str] = match stem.as_str() {
            "ffplay" => &["-autoexit", "-nodisp", "-loglevel", "error"],
            "mpv" => &["--no-video", "--really-quiet"],
            "aplay" => &["-q"],
            _ => &[],
        };
        Self { program, args: args.iter().map(|s| s.to_string()).collect() }
    }

    pub fn command(&self, artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(artifact);
        cmd
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Platform default when the settings say [`BackendKind::Auto`].
pub fn platform_default() -> BackendKind {
    if cfg!(windows) {
        BackendKind::EdgeTts
    } else if cfg!(target_os = "macos") {
        BackendKind::Say
    } else {
        BackendKind::EspeakNg
    }
}

fn default_synthesizer(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::EdgeTts => "edge-tts",
        BackendKind::Say => "say",
        BackendKind::EspeakNg | BackendKind::Auto => "espeak-ng",
    }
}

fn default_player(kind: BackendKind) -> String {
    let candidates: &[&str] = match kind {
        BackendKind::EdgeTts => &["ffplay", "mpv"],
        BackendKind::Say => &["afplay"],
        BackendKind::EspeakNg | BackendKind::Auto => &["aplay", "pw-play", "paplay", "ffplay"],
    };
    candidates
        .iter()
        .find(|c| executable_in_path(c))
        .unwrap_or(&candidates[0])
        .to_string()
}

/// Build a backend of `kind` without checking that its executables exist.
pub fn build(
    kind: BackendKind,
    synthesizer: impl Into<String>,
    player: Player,
) -> Arc<dyn SpeechBackend> {
    let synthesizer = synthesizer.into();
    match kind {
        BackendKind::EdgeTts => Arc::new(EdgeTts::new(synthesizer, player)),
        BackendKind::Say => Arc::new(Say::new(synthesizer, player)),
        BackendKind::EspeakNg | BackendKind::Auto => Arc::new(EspeakNg::new(synthesizer, player)),
    }
}

/// Pick and verify the backend the settings ask for.
///
/// Fails with [`SpeechError::BackendUnavailable`] when the synthesis
/// executable cannot be found. A missing player only logs a warning: each
/// playback will then fail and be reported individually.
pub fn detect(settings: &Settings) -> Result<Arc<dyn SpeechBackend>> {
    let kind = match settings.backend {
        BackendKind::Auto => platform_default(),
        other => other,
    };
    let synthesizer = settings
        .synthesizer_program
        .clone()
        .unwrap_or_else(|| default_synthesizer(kind).to_string());
    if !executable_in_path(&synthesizer) {
        return Err(SpeechError::BackendUnavailable(format!(
            "'{synthesizer}' not found on PATH ({kind:?} backend)"
        )));
    }

    let player = settings.player_program.clone().unwrap_or_else(|| default_player(kind));
    if !executable_in_path(&player) {
        warn!(player = %player, "audio player not found on PATH; playback will fail");
    }

    info!(backend = ?kind, synthesizer = %synthesizer, player = %player, "speech backend selected");
    Ok(build(kind, synthesizer, Player::for_program(player)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_player_flags() {
        let ffplay = Player::for_program("/usr/bin/ffplay");
        assert_eq!(
            args(&ffplay.command(Path::new("a.mp3"))),
            vec!["-autoexit", "-nodisp", "-loglevel", "error", "a.mp3"]
        );
        let aplay = Player::for_program("aplay");
        assert_eq!(args(&aplay.command(Path::new("a.wav"))), vec!["-q", "a.wav"]);
        let other = Player::for_program("pw-play");
        assert_eq!(args(&other.command(Path::new("a.wav"))), vec!["a.wav"]);
    }

    #[test]
    fn test_detect_missing_synthesizer() {
        let settings = Settings {
            backend: BackendKind::EspeakNg,
            synthesizer_program: Some("definitely-not-a-real-tts-xyz".into()),
            ..Settings::default()
        };
        assert!(matches!(detect(&settings), Err(SpeechError::BackendUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_override_and_missing_player() {
        let settings = Settings {
            backend: BackendKind::Say,
            synthesizer_program: Some("sh".into()),
            player_program: Some("definitely-not-a-real-player-xyz".into()),
            ..Settings::default()
        };
        let backend = detect(&settings).unwrap();
        assert_eq!(backend.name(), "say");
        assert_eq!(backend.artifact_extension(), "aiff");
    }

    #[test]
    fn test_build_kinds() {
        let player = Player::for_program("ffplay");
        assert_eq!(build(BackendKind::EdgeTts, "edge-tts", player.clone()).name(), "edge-tts");
        assert_eq!(build(BackendKind::EspeakNg, "espeak-ng", player.clone()).name(), "espeak-ng");
        assert_eq!(build(BackendKind::Auto, "espeak-ng", player).artifact_extension(), "wav");
    }
}
