//! Child-process plumbing shared by every backend: spawn, wait with a
//! deadline, kill on cancellation, collect stderr for diagnostics.

use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{bail, Context, Result};
use tokio::{io::AsyncReadExt, process::Command, sync::watch};
use tracing::{debug, warn};

/// How long stderr may stay open after the child exited. A grandchild that
/// inherited the pipe can hold it open indefinitely.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// How a supervised child process ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Exited on its own with success.
    Success,
    /// Exited on its own with a failure status; carries stderr.
    Failed { status: std::process::ExitStatus, stderr: String },
    /// Killed because the cancel signal fired.
    Cancelled,
    /// Killed because it overran its deadline.
    TimedOut(Duration),
}

/// Resolves once `cancel` carries `true`, or once its sender is gone.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|c| *c).await;
}

/// Spawn `cmd` and supervise it until it exits, is cancelled or times out.
///
/// Only a failure to spawn is an `Err`; everything after that is reported
/// through [`ProcessOutcome`]. Killing is best-effort: a kill failure is
/// logged and the outcome is still `Cancelled` / `TimedOut`.
pub async fn supervise(
    mut cmd: Command,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<ProcessOutcome> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    if *cancel.borrow() {
        return Ok(ProcessOutcome::Cancelled);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to launch '{program}'"))?;
    debug!(program = %program, pid = ?child.id(), "spawned");

    let mut stderr_reader = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).trim().to_string()
        })
    });

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancelled(cancel) => None,
        _ = tokio::time::sleep(timeout) => None,
    };

    let outcome = match waited {
        Some(status) => {
            let status = status.with_context(|| format!("failed waiting for '{program}'"))?;
            if status.success() {
                ProcessOutcome::Success
            } else {
                let stderr = match stderr_reader.take() {
                    Some(mut handle) => {
                        match tokio::time::timeout(STDERR_GRACE, &mut handle).await {
                            Ok(joined) => joined.unwrap_or_default(),
                            Err(_) => {
                                handle.abort();
                                warn!(program = %program, "stderr still open after exit");
                                String::new()
                            }
                        }
                    }
                    None => String::new(),
                };
                ProcessOutcome::Failed { status, stderr }
            }
        }
        None => {
            if let Err(e) = child.kill().await {
                warn!(program = %program, error = %e, "failed to terminate child process");
            }
            if *cancel.borrow() || cancel.has_changed().is_err() {
                ProcessOutcome::Cancelled
            } else {
                ProcessOutcome::TimedOut(timeout)
            }
        }
    };
    if let Some(handle) = stderr_reader {
        handle.abort();
    }
    Ok(outcome)
}

/// Check that synthesis left a usable artifact behind.
///
/// Any file must exist and be non-empty; a WAV file must also contain at
/// least one sample (espeak-ng writes a bare header for unspeakable input).
pub fn validate_artifact(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("no artifact at {}", path.display()))?;
    if meta.len() == 0 {
        bail!("artifact {} is empty", path.display());
    }
    let is_wav = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if is_wav {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("artifact {} is not a readable WAV", path.display()))?;
        if reader.duration() == 0 {
            bail!("artifact {} holds no audio samples", path.display());
        }
    }
    Ok(())
}

/// Delete an artifact, tolerating one that was never created.
pub fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "artifact removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
    }
}

/// `true` if `command` names an executable file, either directly (a path) or
/// through `$PATH`.
pub fn executable_in_path(command: &str) -> bool {
    let direct = Path::new(command);
    if direct.components().count() > 1 {
        return direct.is_file();
    }
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };

    #[cfg(windows)]
    let exts: Vec<String> = std::env::var_os("PATHEXT")
        .map(|v| {
            v.to_string_lossy()
                .split(';')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| vec![".exe".to_string(), ".bat".to_string(), ".cmd".to_string()]);

    for dir in std::env::split_paths(&path_var) {
        if dir.join(command).is_file() {
            return true;
        }
        #[cfg(windows)]
        {
            for ext in &exts {
                if dir.join(format!("{command}{ext}")).is_file() {
                    return true;
                }
            }
        }
    }
    false
}

/// Run a short-lived query command (voice listing) and return its stdout.
pub async fn capture_stdout(mut cmd: Command, timeout: Duration) -> Result<String> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .with_context(|| format!("'{program}' did not answer within {timeout:?}"))?
        .with_context(|| format!("failed to execute '{program}'"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("'{program}' failed ({}): {}", output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_validate_artifact() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.wav");
        assert!(validate_artifact(&missing).is_err());

        let empty = dir.path().join("empty.mp3");
        std::fs::write(&empty, b"").unwrap();
        assert!(validate_artifact(&empty).is_err());

        let mp3 = dir.path().join("ok.mp3");
        std::fs::write(&mp3, b"ID3fake").unwrap();
        assert!(validate_artifact(&mp3).is_ok());

        let silent = dir.path().join("silent.wav");
        write_wav(&silent, 0);
        assert!(validate_artifact(&silent).is_err());

        let voiced = dir.path().join("voiced.wav");
        write_wav(&voiced, 1_000);
        assert!(validate_artifact(&voiced).is_ok());
    }

    #[test]
    fn test_remove_artifact_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.raw");
        std::fs::write(&path, b"x").unwrap();
        remove_artifact(&path);
        assert!(!path.exists());
        remove_artifact(&path);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_in_path() {
        assert!(executable_in_path("sh"));
        assert!(executable_in_path("/bin/sh"));
        assert!(!executable_in_path("definitely-not-a-real-program-xyz"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervise_outcomes() {
        let (_tx, mut rx) = watch::channel(false);

        let mut ok = Command::new("sh");
        ok.args(["-c", "exit 0"]);
        assert!(matches!(
            supervise(ok, Duration::from_secs(5), &mut rx).await.unwrap(),
            ProcessOutcome::Success
        ));

        let mut fail = Command::new("sh");
        fail.args(["-c", "echo boom >&2; exit 3"]);
        match supervise(fail, Duration::from_secs(5), &mut rx).await.unwrap() {
            ProcessOutcome::Failed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let mut slow = Command::new("sh");
        slow.args(["-c", "sleep 5"]);
        assert!(matches!(
            supervise(slow, Duration::from_millis(100), &mut rx).await.unwrap(),
            ProcessOutcome::TimedOut(_)
        ));

        let missing = Command::new("definitely-not-a-real-program-xyz");
        assert!(supervise(missing, Duration::from_secs(1), &mut rx).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_not_held_by_inherited_stderr() {
        let (_tx, mut rx) = watch::channel(false);
        // The background sleep keeps the stderr pipe open after `sh` exits.
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5 & exit 4"]);
        let started = std::time::Instant::now();
        match supervise(cmd, Duration::from_secs(30), &mut rx).await.unwrap() {
            ProcessOutcome::Failed { status, .. } => assert_eq!(status.code(), Some(4)),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervise_cancel_kills() {
        let (tx, mut rx) = watch::channel(false);
        let mut slow = Command::new("sh");
        slow.args(["-c", "sleep 5"]);
        let started = std::time::Instant::now();
        let handle =
            tokio::spawn(async move { supervise(slow, Duration::from_secs(30), &mut rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, ProcessOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'Name: a\\nGender: Female\\n'"]);
        let out = capture_stdout(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, "Name: a\nGender: Female\n");
    }
}
