//! Microsoft Edge neural voices through the `edge-tts` command-line tool.

use std::path::Path;

use tokio::process::Command;

use super::{Player, SpeechBackend};
use crate::voice::{VoiceEntry, VoiceProfile};

#[derive(Debug, Clone)]
pub struct EdgeTts {
    program: String,
    player: Player,
}

impl EdgeTts {
    pub fn new(program: impl Into<String>, player: Player) -> Self {
        Self { program: program.into(), player }
    }
}

/// `rate` step → percentage offset (`+20%`).
fn rate_arg(rate: i32) -> String {
    format!("{:+}%", rate * 10)
}

/// `volume` 0..=100 → offset from full volume (`-30%`).
fn volume_arg(volume: i32) -> String {
    format!("{:+}%", volume - 100)
}

/// `pitch` step → frequency offset (`-10Hz`).
fn pitch_arg(pitch: i32) -> String {
    format!("{:+}Hz", pitch * 5)
}

impl SpeechBackend for EdgeTts {
    fn name(&self) -> &'static str {
        "edge-tts"
    }

    fn artifact_extension(&self) -> &'static str {
        "mp3"
    }

    fn synthesis_command(&self, text: &str, profile: &VoiceProfile, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        // `--opt=value` keeps argparse from reading a leading '-' as a flag.
        cmd.arg(format!("--voice={}", profile.voice_id))
            .arg(format!("--rate={}", rate_arg(profile.rate)))
            .arg(format!("--volume={}", volume_arg(profile.volume)))
            .arg(format!("--pitch={}", pitch_arg(profile.pitch)))
            .arg(format!("--text={text}"))
            .arg("--write-media")
            .arg(output);
        cmd
    }

    fn playback_command(&self, artifact: &Path) -> Command {
        self.player.command(artifact)
    }

    fn list_voices_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--list-voices");
        cmd
    }

    /// Accepts both listing layouts `edge-tts` has shipped: `Name:`/`Gender:`
    /// line pairs, and the newer whitespace-aligned table.
    fn parse_voices(&self, output: &str) -> Vec<VoiceEntry> {
        let mut voices = Vec::new();
        let mut pending: Option<String> = None;

        for line in output.lines() {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("Name:") {
                pending = Some(name.trim().to_string());
            } else if let Some(gender) = line.strip_prefix("Gender:") {
                if let Some(id) = pending.take() {
                    voices.push(VoiceEntry { id, gender: gender.trim().to_string() });
                }
            } else if line.contains(':') || line.starts_with("Name") || line.starts_with('-') {
                continue;
            } else {
                let mut cols = line.split_whitespace();
                if let (Some(id), Some(gender)) = (cols.next(), cols.next()) {
                    if id.contains('-') {
                        voices.push(VoiceEntry { id: id.to_string(), gender: gender.to_string() });
                    }
                }
            }
        }
        voices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceRole;

    fn backend() -> EdgeTts {
        EdgeTts::new("edge-tts", Player::for_program("ffplay"))
    }

    fn encoded(entries: Vec<VoiceEntry>) -> Vec<String> {
        entries.iter().map(VoiceEntry::encode).collect()
    }

    #[test]
    fn test_parse_line_pairs() {
        let out =
            "Name: en-IE-EmilyNeural\nGender: Female\n\nName: en-GB-RyanNeural\nGender: Male\n";
        assert_eq!(
            encoded(backend().parse_voices(out)),
            vec!["en-IE-EmilyNeural#Female", "en-GB-RyanNeural#Male"]
        );
    }

    #[test]
    fn test_parse_table() {
        let out = "\
Name                               Gender    ContentCategories      VoicePersonalities
---------------------------------  --------  ---------------------  --------------------------------------
af-ZA-AdriNeural                   Female    General                Friendly, Positive
en-US-GuyNeural                    Male      News, Novel            Passion
";
        assert_eq!(
            encoded(backend().parse_voices(out)),
            vec!["af-ZA-AdriNeural#Female", "en-US-GuyNeural#Male"]
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(backend().parse_voices("").is_empty());
        assert!(backend().parse_voices("Gender: Female\nrandom").is_empty());
    }

    #[test]
    fn test_synthesis_args() {
        let profile = VoiceProfile {
            role: VoiceRole::Female,
            voice_id: "en-IE-EmilyNeural".into(),
            pitch: -2,
            rate: 3,
            volume: 70,
        };
        let cmd = backend().synthesis_command("Hello there", &profile, Path::new("/tmp/x.mp3"));
        let args: Vec<String> =
            cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--voice=en-IE-EmilyNeural",
                "--rate=+30%",
                "--volume=-30%",
                "--pitch=-10Hz",
                "--text=Hello there",
                "--write-media",
                "/tmp/x.mp3",
            ]
        );
    }

    #[test]
    fn test_neutral_args() {
        assert_eq!(rate_arg(0), "+0%");
        assert_eq!(volume_arg(100), "+0%");
        assert_eq!(pitch_arg(0), "+0Hz");
    }
}
