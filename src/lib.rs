//! # speechmod
//!
//! Speech pipeline for game narration. In-game text (narration, dialog lines
//! with narrator spans, voice previews) is normalised, split into chunks,
//! voiced by an external text-to-speech executable and played back in order,
//! with new speech able to interrupt old.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use speechmod::{Gender, Settings, SettingsHandle, Speech};
//!
//! # async fn run() -> speechmod::Result<()> {
//! let settings = SettingsHandle::new(Settings::default());
//! let speech = Speech::start_detected(settings).await?;
//!
//! speech.speak("The gates creak open.", Duration::ZERO);
//! speech.speak_dialog(
//!     "<color=#616060>The guard looks up.</color>Halt! Who goes there?",
//!     Duration::from_millis(250),
//!     Some(Gender::Male),
//! );
//! println!("{}", speech.status_message());
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//! | Platform | Synthesiser                  | Player   |
//! |----------|------------------------------|----------|
//! | Windows  | `edge-tts` (neural voices)   | `ffplay` |
//! | Linux    | `espeak-ng`                  | `aplay`  |
//! | macOS    | `say`                        | `afplay` |
//!
//! Either executable can be overridden in [`Settings`].
//!
//! ## Pipeline
//! 1. **Normalisation**: markup, glossary links and command-line-hostile
//!    punctuation removed.
//! 2. **Dialog split**: narrator spans and speaker lines become separate
//!    voice segments.
//! 3. **Voice resolution**: each role mapped to a voice id plus pitch, rate
//!    and volume from the settings.
//! 4. **Chunking**: lines, then word-bounded pieces of at most
//!    `max_chunk_chars`.
//! 5. **Queue**: concurrent synthesis, strictly ordered playback, one chunk
//!    audible at a time.

pub mod backend;
pub mod chunk;
pub mod config;
pub mod dialog;
pub mod error;
// C ABI for the game mod: speechmod_create / speak / stop / destroy.
pub mod ffi;
pub mod normalize;
pub mod queue;
#[cfg(feature = "server")]
pub mod server;
pub mod speech;
pub mod status;
pub mod voice;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::{Settings, SettingsHandle};
pub use error::{Result, SpeechError};
pub use speech::{Speech, SpeechRequest};
pub use status::QueueStatus;
pub use voice::{Gender, VoiceRole};
