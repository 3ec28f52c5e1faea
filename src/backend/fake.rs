//! Scripted `sh` backend for the queue and facade tests.
//!
//! The chunk text steers the script:
//!
//! | prefix     | effect                                              |
//! |------------|-----------------------------------------------------|
//! | `fail`     | synthesis exits non-zero                            |
//! | `empty`    | synthesis exits 0 without writing the artifact      |
//! | `slow`     | synthesis takes 0.4 s                               |
//! | `hang`     | synthesis takes 5 s                                 |
//! | `long`     | playback takes 5 s                                  |
//! | `badplay`  | playback exits non-zero                             |
//! | `nostart`  | the player executable does not exist                |
//!
//! Every finished playback appends the chunk text to `log`, so tests can
//! read back the audible order; every synthesis appends `voice:text` to
//! `synth_log`.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::SpeechBackend;
use crate::voice::{VoiceEntry, VoiceProfile};

const SYNTH_SCRIPT: &str = r#"case "$1" in
  fail*) exit 1 ;;
  empty*) exit 0 ;;
  slow*) sleep 0.4 ;;
  hang*) sleep 5 ;;
  *) sleep 0.02 ;;
esac
printf '%s:%s\n' "$3" "$1" >> "$4"
printf '%s' "$1" > "$2""#;

const PLAY_SCRIPT: &str = r#"c=$(cat "$1")
case "$c" in
  long*) sleep 5 ;;
  badplay*) exit 2 ;;
  *) sleep 0.05 ;;
esac
printf '%s\n' "$c" >> "$2""#;

const MISSING_PLAYER: &str = "speechmod-test-missing-player";

#[derive(Debug, Clone)]
pub struct FakeBackend {
    pub log: PathBuf,
    pub synth_log: PathBuf,
    /// `id gender` lines returned by the voice listing.
    pub voices: String,
}

impl FakeBackend {
    pub fn new(dir: &Path) -> Self {
        Self {
            log: dir.join("played.log"),
            synth_log: dir.join("synthesized.log"),
            voices: "fake-a Female\nfake-b Male\nfake-c Male\n".into(),
        }
    }

    /// Chunk texts in the order they finished playing.
    pub fn played(&self) -> Vec<String> {
        read_lines(&self.log)
    }

    /// `voice:text` for every successful synthesis, in completion order.
    pub fn synthesized(&self) -> Vec<String> {
        read_lines(&self.synth_log)
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

impl SpeechBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn artifact_extension(&self) -> &'static str {
        "raw"
    }

    fn synthesis_command(&self, text: &str, profile: &VoiceProfile, output: &Path) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(SYNTH_SCRIPT)
            .arg("sh")
            .arg(text)
            .arg(output)
            .arg(&profile.voice_id)
            .arg(&self.synth_log);
        cmd
    }

    fn playback_command(&self, artifact: &Path) -> Command {
        let content = std::fs::read_to_string(artifact).unwrap_or_default();
        if content.starts_with("nostart") {
            return Command::new(MISSING_PLAYER);
        }
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(PLAY_SCRIPT).arg("sh").arg(artifact).arg(&self.log);
        cmd
    }

    fn list_voices_command(&self) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(r#"printf '%s' "$1""#).arg("sh").arg(&self.voices);
        cmd
    }

    fn parse_voices(&self, output: &str) -> Vec<VoiceEntry> {
        output
            .lines()
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                Some(VoiceEntry { id: cols.next()?.to_string(), gender: cols.next()?.to_string() })
            })
            .collect()
    }
}
