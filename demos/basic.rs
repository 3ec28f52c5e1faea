//! Basic speechmod example: speaks a narration line and a dialog line
//! through the platform's default backend.
//!
//! Usage:
//!   cargo run --example basic
//!   cargo run --example basic -- --text "Hello from Rust!" --gender female
//!
//! Requirements:
//!   - Linux: espeak-ng and aplay on $PATH (apt install espeak-ng alsa-utils)
//!   - macOS: nothing, `say` and `afplay` ship with the OS
//!   - Windows: edge-tts (pip install edge-tts) and ffplay

use std::time::Duration;

use speechmod::{Gender, QueueStatus, Settings, SettingsHandle, Speech};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Parse simple CLI arguments ───────────────────────────────────────────
    let mut args = std::env::args().skip(1);

    let mut text = "The gates creak open. Somewhere below, water drips.".to_string();
    let mut dialog = "<color=#616060>The guard looks up.</color>Halt! Who goes there?".to_string();
    let mut gender = Gender::Male;
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--text"   => { if let Some(v) = args.next() { text   = v; } }
            "--dialog" => { if let Some(v) = args.next() { dialog = v; } }
            "--gender" => { if let Some(v) = args.next() { gender = Gender::parse(&v); } }
            "--config" => { config = args.next(); }
            "--help"   => {
                println!(
                    "Usage: basic [--config FILE] [--text TEXT] [--dialog MARKUP] \
                     [--gender female|male]"
                );
                return Ok(());
            }
            _ => {}
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("speechmod=info")),
        )
        .init();

    let settings = match config {
        Some(path) => Settings::load(std::path::Path::new(&path))?,
        None => Settings::default(),
    };

    // ── Start the pipeline ───────────────────────────────────────────────────
    let speech = Speech::start_detected(SettingsHandle::new(settings)).await?;
    let voices = speech.available_voices().await;
    println!("Backend: {}", speech.backend_name());
    println!("Voices : {} available (first: {:?})", voices.len(), voices.first());
    println!();

    // ── Speak ────────────────────────────────────────────────────────────────
    let narrated = speech.speak(&text, Duration::ZERO);
    // Queued behind the narration only when new speech does not interrupt.
    let spoken = speech.speak_dialog(&dialog, Duration::from_millis(300), Some(gender));
    println!("Queued {narrated} + {spoken} chunks");

    let reporter = speech.reporter().clone();
    if narrated + spoken > 0 {
        reporter.wait_for(|s| s.state != QueueStatus::Idle).await;
    }
    while reporter.status() != QueueStatus::Idle {
        println!("{}", reporter.message());
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    println!("{}", reporter.message());

    speech.shutdown().await;
    println!("Done!");
    Ok(())
}
