//! Error taxonomy for the speech pipeline.
//!
//! Only [`SpeechError::BackendUnavailable`] is fatal, and only at start-up.
//! Every other variant is recovered where it happens and surfaced through the
//! [`StatusReporter`](crate::status::StatusReporter).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    /// Invalid or missing voice selection; the caller falls back to the
    /// built-in default profile.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request carried nothing speakable.
    #[error("no text to speak")]
    EmptyInput,

    #[error("synthesis of chunk {index} failed: {reason}")]
    SynthesisFailure { index: usize, reason: String },

    #[error("playback of chunk {index} failed: {reason}")]
    PlaybackFailure { index: usize, reason: String },

    /// No usable synthesis backend on this platform; the feature must disable
    /// itself.
    #[error("speech backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = SpeechError::SynthesisFailure { index: 3, reason: "exit status 1".into() };
        assert_eq!(e.to_string(), "synthesis of chunk 3 failed: exit status 1");
        assert_eq!(SpeechError::EmptyInput.to_string(), "no text to speak");
    }

    #[test]
    fn test_settings_error_from_json() {
        let e: SpeechError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(e.to_string().starts_with("invalid settings: "));
    }
}
