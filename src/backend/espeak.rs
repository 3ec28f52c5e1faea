//! eSpeak NG, driven through its command-line front end.

use std::path::Path;

use tokio::process::Command;

use super::{Player, SpeechBackend};
use crate::voice::{VoiceEntry, VoiceProfile};

/// espeak-ng's own defaults for `-p` and `-s`.
const BASE_PITCH: i32 = 50;
const BASE_SPEED_WPM: i32 = 175;

#[derive(Debug, Clone)]
pub struct EspeakNg {
    program: String,
    player: Player,
}

impl EspeakNg {
    pub fn new(program: impl Into<String>, player: Player) -> Self {
        Self { program: program.into(), player }
    }
}

fn pitch_arg(pitch: i32) -> i32 {
    (BASE_PITCH + pitch * 5).clamp(0, 99)
}

fn speed_arg(rate: i32) -> i32 {
    (BASE_SPEED_WPM + rate * 15).clamp(80, 450)
}

fn gender_from_column(col: &str) -> &'static str {
    match col.rsplit('/').next().map(str::trim) {
        Some("M") => "Male",
        Some("F") => "Female",
        _ => "Unknown",
    }
}

impl SpeechBackend for EspeakNg {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn artifact_extension(&self) -> &'static str {
        "wav"
    }

    fn synthesis_command(&self, text: &str, profile: &VoiceProfile, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-v")
            .arg(&profile.voice_id)
            .arg("-p")
            .arg(pitch_arg(profile.pitch).to_string())
            .arg("-s")
            .arg(speed_arg(profile.rate).to_string())
            .arg("-a")
            .arg(profile.volume.to_string())
            .arg("-w")
            .arg(output)
            .arg("--")
            .arg(text);
        cmd
    }

    fn playback_command(&self, artifact: &Path) -> Command {
        self.player.command(artifact)
    }

    fn list_voices_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--voices");
        cmd
    }

    /// Parses the `--voices` table:
    ///
    /// ```text
    /// Pty Language       Age/Gender VoiceName          File          Other Languages
    ///  5  en-gb           --/M      English_(Great_Britain) gmw/en
    /// ```
    ///
    /// The language column is what `-v` accepts, so it becomes the voice id.
    fn parse_voices(&self, output: &str) -> Vec<VoiceEntry> {
        output
            .lines()
            .filter_map(|line| {
                let cols: Vec<&str> = line.split_whitespace().collect();
                match cols.as_slice() {
                    [pty, lang, age_gender, ..] if pty.parse::<u32>().is_ok() => Some(VoiceEntry {
                        id: lang.to_string(),
                        gender: gender_from_column(age_gender).to_string(),
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceRole;

    fn backend() -> EspeakNg {
        EspeakNg::new("espeak-ng", Player::for_program("aplay"))
    }

    #[test]
    fn test_parse_voices() {
        let out = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-gb           --/F      English_(Great_Britain) gmw/en       (en 2)
 5  eo              --/-      Esperanto          art/eo
";
        let voices: Vec<String> =
            backend().parse_voices(out).iter().map(VoiceEntry::encode).collect();
        assert_eq!(voices, vec!["af#Male", "en-gb#Female", "eo#Unknown"]);
    }

    #[test]
    fn test_synthesis_args() {
        let profile = VoiceProfile {
            role: VoiceRole::Male,
            voice_id: "en-gb".into(),
            pitch: 2,
            rate: -1,
            volume: 60,
        };
        let cmd = backend().synthesis_command("Good day", &profile, Path::new("/tmp/o.wav"));
        let args: Vec<String> =
            cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-v", "en-gb", "-p", "60", "-s", "160", "-a", "60", "-w", "/tmp/o.wav", "--",
                "Good day"
            ]
        );
    }

    #[test]
    fn test_scales_clamped() {
        assert_eq!(pitch_arg(10), 99);
        assert_eq!(pitch_arg(-10), 0);
        assert_eq!(speed_arg(-10), 80);
        assert_eq!(speed_arg(10), 325);
    }
}
