//! macOS `say`.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use super::{Player, SpeechBackend};
use crate::voice::{VoiceEntry, VoiceProfile};

/// `Alex                en_US    # Most people recognize me by my voice.`
static RE_VOICE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+[a-z]{2,3}[_-][A-Za-z0-9]+\s+#").unwrap());

#[derive(Debug, Clone)]
pub struct Say {
    program: String,
    player: Player,
}

impl Say {
    pub fn new(program: impl Into<String>, player: Player) -> Self {
        Self { program: program.into(), player }
    }
}

/// Prefix `text` with the embedded commands for pitch and volume.
fn embed_controls(text: &str, profile: &VoiceProfile) -> String {
    format!(
        "[[pbas {:+}]][[volm {:.2}]]{}",
        profile.pitch * 2,
        f64::from(profile.volume) / 100.0,
        text
    )
}

impl SpeechBackend for Say {
    fn name(&self) -> &'static str {
        "say"
    }

    fn artifact_extension(&self) -> &'static str {
        "aiff"
    }

    fn synthesis_command(&self, text: &str, profile: &VoiceProfile, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-v")
            .arg(&profile.voice_id)
            .arg("-r")
            .arg((175 + profile.rate * 15).to_string())
            .arg("-o")
            .arg(output)
            .arg(embed_controls(text, profile));
        cmd
    }

    fn playback_command(&self, artifact: &Path) -> Command {
        self.player.command(artifact)
    }

    fn list_voices_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-v", "?"]);
        cmd
    }

    /// `say` does not report gender, so every entry is `Unknown`.
    fn parse_voices(&self, output: &str) -> Vec<VoiceEntry> {
        output
            .lines()
            .filter_map(|line| RE_VOICE_LINE.captures(line))
            .map(|caps| VoiceEntry {
                id: caps[1].trim().to_string(),
                gender: "Unknown".to_string(),
            })
            .collect()
    }
}
