//! Host-facing entry points.
//!
//! [`Speech`] ties the pipeline together:
//!
//! ```text
//! raw text ─► normalize ─► (dialog split) ─► resolve voice ─► chunk ─► queue
//! ```
//!
//! Every entry point returns immediately and never fails towards the host:
//! problems are logged and surfaced through [`Speech::status_message`].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    backend::{self, SpeechBackend},
    chunk::{Chunker, TextChunk},
    config::{Settings, SettingsHandle},
    dialog::format_dialog,
    error::{Result, SpeechError},
    normalize::TextNormalizer,
    queue::{ChunkEvent, SpeechQueue, SubmitOptions},
    status::{QueueStatus, StatusReporter},
    voice::{Gender, VoiceEntry, VoiceProfile, VoiceResolver, VoiceRole},
};

/// One call from the host, as received.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub raw_text: String,
    /// `None` for narration.
    pub speaker: Option<VoiceRole>,
    pub requested_at: Instant,
    /// Playback of the first chunk waits until `requested_at + delay`.
    pub delay: Duration,
}

impl SpeechRequest {
    pub fn new(raw_text: impl Into<String>, speaker: Option<VoiceRole>, delay: Duration) -> Self {
        Self { raw_text: raw_text.into(), speaker, requested_at: Instant::now(), delay }
    }

    /// Delay still left to wait, measured from when the request was made.
    fn remaining_delay(&self) -> Duration {
        self.delay.saturating_sub(self.requested_at.elapsed())
    }
}

#[derive(Debug)]
pub struct Speech {
    settings: SettingsHandle,
    backend: Arc<dyn SpeechBackend>,
    normalizer: TextNormalizer,
    resolver: VoiceResolver,
    queue: SpeechQueue,
}

impl Speech {
    /// Start the pipeline on `backend`.
    ///
    /// Voices are enumerated from the backend; when the settings carry no
    /// voice list yet, the enumerated one is installed. Fails with
    /// [`SpeechError::BackendUnavailable`] when no voice is known at all, in
    /// which case the host must disable speech.
    pub async fn start(settings: SettingsHandle, backend: Arc<dyn SpeechBackend>) -> Result<Self> {
        let voices = match backend::list_voices(backend.as_ref()).await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(
                    backend = backend.name(),
                    error = %format!("{e:#}"),
                    "could not enumerate voices"
                );
                Vec::new()
            }
        };
        info!(backend = backend.name(), voices = voices.len(), "voices enumerated");

        let encoded: Vec<String> = voices.iter().map(VoiceEntry::encode).collect();
        if settings.seed_voices(encoded) {
            debug!("voice list installed from backend");
        }
        if settings.snapshot().available_voices.is_empty() {
            return Err(SpeechError::BackendUnavailable(format!(
                "{} reported no voices",
                backend.name()
            )));
        }

        let queue = SpeechQueue::spawn(Arc::clone(&backend), settings.clone());
        let resolver = VoiceResolver::new(settings.clone());
        Ok(Self { settings, backend, normalizer: TextNormalizer::new(), resolver, queue })
    }

    /// Detect the platform backend from the settings, then [`start`](Self::start).
    pub async fn start_detected(settings: SettingsHandle) -> Result<Self> {
        let backend = backend::detect(&settings.snapshot())?;
        Self::start(settings, backend).await
    }

    /// Speak `text` in `role`'s voice, as the settings screen does when the
    /// user tries a voice out.
    pub fn speak_preview(&self, text: &str, role: VoiceRole) -> usize {
        let settings = self.settings.snapshot();
        let request = SpeechRequest::new(text, Some(role), Duration::ZERO);
        let profile = self.reported(self.resolver.resolve_role_or_default(role));
        let text = self.normalizer.normalize(&request.raw_text);
        let chunks = self.chunker(&settings).chunk(&text, profile);
        self.enqueue(&request, chunks, settings.preview_interrupts)
    }

    /// Narration: the whole text in the narrator voice.
    pub fn speak(&self, text: &str, delay: Duration) -> usize {
        let settings = self.settings.snapshot();
        let request = SpeechRequest::new(text, None, delay);
        let chunks = self.narration_chunks(&settings, &request);
        self.enqueue(&request, chunks, settings.interrupt_playback_on_play)
    }

    /// Dialog line: narrator-coloured spans in the narrator voice, the rest
    /// in the voice for `speaker`'s gender.
    pub fn speak_dialog(&self, text: &str, delay: Duration, speaker: Option<Gender>) -> usize {
        let settings = self.settings.snapshot();
        if !settings.use_gender_specific_voices {
            return self.speak(text, delay);
        }
        let role = speaker.and_then(Gender::role);
        let request = SpeechRequest::new(text, role, delay);
        let chunks = self.dialog_chunks(&settings, &request);
        self.enqueue(&request, chunks, settings.interrupt_playback_on_play)
    }

    pub fn stop(&self) {
        self.queue.stop();
    }

    pub fn status(&self) -> QueueStatus {
        self.queue.status().status()
    }

    pub fn status_message(&self) -> String {
        self.queue.status().message()
    }

    pub fn reporter(&self) -> &StatusReporter {
        self.queue.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.queue.subscribe()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Voices as `"voiceId#gender"`, fresh from the backend when it answers,
    /// otherwise the list the settings carry.
    pub async fn available_voices(&self) -> Vec<String> {
        match backend::list_voices(self.backend.as_ref()).await {
            Ok(voices) if !voices.is_empty() => voices.iter().map(VoiceEntry::encode).collect(),
            Ok(_) => self.settings.snapshot().available_voices,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "voice enumeration failed; using configured list");
                self.settings.snapshot().available_voices
            }
        }
    }

    /// Cancel all speech and wait for child processes and artifacts to be
    /// cleaned up.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn chunker(&self, settings: &Settings) -> Chunker {
        Chunker::new(settings.max_chunk_chars)
    }

    /// Resolved profile; a fallback's cause goes to the status line.
    fn reported(&self, resolved: (VoiceProfile, Option<SpeechError>)) -> Arc<VoiceProfile> {
        let (profile, err) = resolved;
        if let Some(err) = err {
            self.queue.report(err.to_string());
        }
        Arc::new(profile)
    }

    fn narration_chunks(&self, settings: &Settings, request: &SpeechRequest) -> Vec<TextChunk> {
        let profile = self.reported(self.resolver.resolve_or_default(request.speaker));
        let text = self.normalizer.normalize(&request.raw_text);
        self.chunker(settings).chunk(&text, profile)
    }

    fn dialog_chunks(&self, settings: &Settings, request: &SpeechRequest) -> Vec<TextChunk> {
        let speaker = VoiceResolver::effective_role(settings, request.speaker);
        let segments = format_dialog(&request.raw_text, speaker);

        let mut profiles: Vec<(VoiceRole, Arc<VoiceProfile>)> = Vec::new();
        let mut normalized = Vec::with_capacity(segments.len());
        for segment in &segments {
            let profile = match profiles.iter().find(|(role, _)| *role == segment.role) {
                Some((_, profile)) => Arc::clone(profile),
                None => {
                    let resolved = self.resolver.resolve_or_default(Some(segment.role));
                    let profile = self.reported(resolved);
                    profiles.push((segment.role, Arc::clone(&profile)));
                    profile
                }
            };
            normalized.push((self.normalizer.normalize(&segment.text), profile));
        }

        let segments =
            normalized.iter().map(|(text, profile)| (text.as_str(), Arc::clone(profile)));
        self.chunker(settings).chunk_segments(segments)
    }

    fn enqueue(&self, request: &SpeechRequest, chunks: Vec<TextChunk>, interrupt: bool) -> usize {
        if chunks.is_empty() {
            debug!(raw = %request.raw_text, "nothing to speak");
            self.queue.report(SpeechError::EmptyInput.to_string());
            return 0;
        }
        let options = SubmitOptions { interrupt, delay: request.remaining_delay() };
        self.queue.submit(chunks, options)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
