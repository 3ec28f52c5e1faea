//! Synthesis & playback queue.
//!
//! One worker task owns all queue state and is driven by commands from
//! [`SpeechQueue`] handles. Every chunk gets a *slot* (a process-wide,
//! monotonically increasing number) and moves through
//!
//! ```text
//! Pending ─► Synthesizing ─► Ready ─► Playing ─► Done
//!    └───────────┴──────────────┴────────┴─────► Cancelled
//! ```
//!
//! Synthesis runs ahead of playback on up to `synthesis_parallelism` spawned
//! tasks; playback takes slots strictly from the front of the queue, one at
//! a time. Each spawned task owns its child process. An artifact belongs to
//! the synthesis task until it reports Ready, then to the worker, then to
//! the playback task; it is deleted when its [`SynthesizedArtifact`] is
//! dropped, wherever that happens.

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::{Id, JoinError, JoinHandle, JoinSet},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{
        process::{self, ProcessOutcome},
        SpeechBackend,
    },
    chunk::TextChunk,
    config::SettingsHandle,
    error::SpeechError,
    status::{QueueStatus, StatusReporter, StatusSnapshot},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    Pending,
    Synthesizing,
    Ready,
    Playing,
    Done,
    Cancelled,
}

impl ChunkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// One state transition, broadcast to every [`SpeechQueue::subscribe`] receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkEvent {
    pub slot: u64,
    /// Position of the chunk within its request.
    pub index: usize,
    pub state: ChunkState,
}

/// Audio file synthesised for one chunk. Owning it means owning the file:
/// dropping it deletes the file.
#[derive(Debug)]
pub struct SynthesizedArtifact {
    path: PathBuf,
}

impl SynthesizedArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SynthesizedArtifact {
    fn drop(&mut self) {
        process::remove_artifact(&self.path);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Cancel everything queued or playing before admitting the new chunks.
    pub interrupt: bool,
    /// Hold playback of the new chunks until this long after submission.
    pub delay: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

enum QueueCommand {
    Submit {
        chunks: Vec<TextChunk>,
        options: SubmitOptions,
        requested_at: Instant,
        limits: Limits,
    },
    Stop,
    Report(String),
    Shutdown,
}

/// Per-request knobs, read from settings when the request is made.
#[derive(Debug, Clone)]
struct Limits {
    work_dir: PathBuf,
    parallelism: usize,
    synthesis_timeout: Duration,
    playback_timeout: Duration,
}

/// Handle to the queue worker. Dropping it shuts the worker down, cancelling
/// whatever is still queued.
#[derive(Debug)]
pub struct SpeechQueue {
    commands: mpsc::UnboundedSender<QueueCommand>,
    events: broadcast::Sender<ChunkEvent>,
    status: StatusReporter,
    settings: SettingsHandle,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for QueueCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit { chunks, options, .. } => f
                .debug_struct("Submit")
                .field("chunks", &chunks.len())
                .field("options", options)
                .finish(),
            Self::Stop => f.write_str("Stop"),
            Self::Report(msg) => f.debug_tuple("Report").field(msg).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl SpeechQueue {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(backend: Arc<dyn SpeechBackend>, settings: SettingsHandle) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status) = StatusReporter::channel();
        let worker = Worker::new(backend, rx, events.clone(), status_tx);
        let worker = tokio::spawn(worker.run());
        Self { commands, events, status, settings, worker }
    }

    /// Queue `chunks` for synthesis and playback. Returns immediately with
    /// the number of chunks admitted; callable from outside the runtime.
    pub fn submit(&self, chunks: Vec<TextChunk>, options: SubmitOptions) -> usize {
        let settings = self.settings.snapshot();
        let limits = Limits {
            work_dir: settings.work_dir(),
            parallelism: settings.synthesis_parallelism.max(1),
            synthesis_timeout: settings.synthesis_timeout(),
            playback_timeout: settings.playback_timeout(),
        };
        let count = chunks.len();
        if count == 0 && !options.interrupt {
            return 0;
        }
        self.send(QueueCommand::Submit { chunks, options, requested_at: Instant::now(), limits });
        count
    }

    /// Cancel everything queued, synthesising or playing.
    pub fn stop(&self) {
        self.send(QueueCommand::Stop);
    }

    /// Record a warning raised outside the queue (empty input, voice
    /// fallback) so it shows up in the status line.
    pub fn report(&self, warning: impl Into<String>) {
        self.send(QueueCommand::Report(warning.into()));
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.events.subscribe()
    }

    /// Cancel everything and wait until every child process is reaped and
    /// every artifact deleted.
    pub async fn shutdown(self) {
        self.send(QueueCommand::Shutdown);
        if let Err(e) = self.worker.await {
            error!(error = %e, "queue worker terminated abnormally");
        }
    }

    fn send(&self, command: QueueCommand) {
        if let Err(e) = self.commands.send(command) {
            warn!(command = ?e.0, "queue worker is gone; command dropped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

struct Slot {
    id: u64,
    chunk: TextChunk,
    state: ChunkState,
    artifact: Option<SynthesizedArtifact>,
    not_before: Instant,
    limits: Arc<Limits>,
}

struct ActivePlayback {
    slot: u64,
    index: usize,
    /// Set once the slot has been cancelled; the player may still be
    /// exiting, and the playback position stays occupied until it has.
    cancelled: bool,
    handle: JoinHandle<PlayOutcome>,
}

#[derive(Debug)]
enum SynthOutcome {
    Ready(SynthesizedArtifact),
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
struct SynthReport {
    slot: u64,
    index: usize,
    outcome: SynthOutcome,
}

#[derive(Debug)]
enum PlayOutcome {
    Done,
    Failed(String),
    Cancelled,
}

enum WorkerEvent {
    Command(Option<QueueCommand>),
    Synthesized(Result<(Id, SynthReport), JoinError>),
    Played(Result<PlayOutcome, JoinError>),
    Tick,
}

struct Worker {
    backend: Arc<dyn SpeechBackend>,
    commands: mpsc::UnboundedReceiver<QueueCommand>,
    events: broadcast::Sender<ChunkEvent>,
    status: watch::Sender<StatusSnapshot>,
    /// Chunks not yet handed to the player, in playback order.
    queue: VecDeque<Slot>,
    playback: Option<ActivePlayback>,
    synthesis: JoinSet<SynthReport>,
    /// Slot and chunk index of every running synthesis task, so a task that
    /// panics can still be matched to its slot.
    synthesizing: HashMap<Id, (u64, usize)>,
    parallelism: usize,
    cancel: watch::Sender<bool>,
    next_slot: u64,
    last_error: Option<String>,
}

impl Worker {
    fn new(
        backend: Arc<dyn SpeechBackend>,
        commands: mpsc::UnboundedReceiver<QueueCommand>,
        events: broadcast::Sender<ChunkEvent>,
        status: watch::Sender<StatusSnapshot>,
    ) -> Self {
        Self {
            backend,
            commands,
            events,
            status,
            queue: VecDeque::new(),
            playback: None,
            synthesis: JoinSet::new(),
            synthesizing: HashMap::new(),
            parallelism: 1,
            cancel: watch::channel(false).0,
            next_slot: 0,
            last_error: None,
        }
    }

    async fn run(mut self) {
        debug!(backend = self.backend.name(), "queue worker started");
        loop {
            self.pump();
            let deadline = self.playback_deadline();

            let event = tokio::select! {
                cmd = self.commands.recv() => WorkerEvent::Command(cmd),
                Some(joined) = self.synthesis.join_next_with_id() => {
                    WorkerEvent::Synthesized(joined)
                }
                joined = join_playback(&mut self.playback) => WorkerEvent::Played(joined),
                _ = sleep_until(deadline) => WorkerEvent::Tick,
            };

            match event {
                WorkerEvent::Command(Some(QueueCommand::Submit {
                    chunks,
                    options,
                    requested_at,
                    limits,
                })) => self.admit(chunks, options, requested_at, limits),
                WorkerEvent::Command(Some(QueueCommand::Stop)) => self.cancel_all("stop requested"),
                WorkerEvent::Command(Some(QueueCommand::Report(warning))) => self.record(warning),
                WorkerEvent::Command(Some(QueueCommand::Shutdown))
                | WorkerEvent::Command(None) => break,
                WorkerEvent::Synthesized(joined) => self.on_synthesized(joined),
                WorkerEvent::Played(joined) => self.on_played(joined),
                WorkerEvent::Tick => {}
            }
        }

        self.cancel_all("shutting down");
        while let Some(joined) = self.synthesis.join_next_with_id().await {
            self.on_synthesized(joined);
        }
        if self.playback.is_some() {
            let joined = join_playback(&mut self.playback).await;
            self.on_played(joined);
        }
        self.publish();
        debug!("queue worker stopped");
    }

    fn admit(
        &mut self,
        chunks: Vec<TextChunk>,
        options: SubmitOptions,
        requested_at: Instant,
        limits: Limits,
    ) {
        if options.interrupt {
            self.cancel_all("interrupted by new speech");
        }
        self.parallelism = limits.parallelism;
        let limits = Arc::new(limits);
        let not_before = requested_at + options.delay;
        info!(
            chunks = chunks.len(),
            interrupt = options.interrupt,
            delay = ?options.delay,
            "speech queued"
        );
        for chunk in chunks {
            let id = self.next_slot;
            self.next_slot += 1;
            self.emit(id, chunk.index, ChunkState::Pending);
            self.queue.push_back(Slot {
                id,
                chunk,
                state: ChunkState::Pending,
                artifact: None,
                not_before,
                limits: Arc::clone(&limits),
            });
        }
    }

    /// Cancel every queued slot and the playing one. Running tasks are told
    /// through the cancel signal; their reports arrive later and find their
    /// slot gone.
    fn cancel_all(&mut self, reason: &str) {
        if self.queue.is_empty() && self.playback.as_ref().map_or(true, |p| p.cancelled) {
            return;
        }
        info!(reason, queued = self.queue.len(), "cancelling speech");

        let previous = std::mem::replace(&mut self.cancel, watch::channel(false).0);
        previous.send_replace(true);

        if let Some(active) = self.playback.as_mut() {
            if !active.cancelled {
                active.cancelled = true;
                let (slot, index) = (active.slot, active.index);
                self.emit(slot, index, ChunkState::Cancelled);
            }
        }
        // Dropping a slot deletes its artifact, if it has one.
        for slot in std::mem::take(&mut self.queue) {
            self.emit(slot.id, slot.chunk.index, ChunkState::Cancelled);
        }
    }

    /// Start whatever can start: the front slot's playback, then synthesis
    /// for pending slots up to the parallelism limit.
    fn pump(&mut self) {
        let now = Instant::now();
        let front_playable = self
            .queue
            .front()
            .map_or(false, |s| s.state == ChunkState::Ready && s.not_before <= now);
        if self.playback.is_none() && front_playable {
            if let Some(slot) = self.queue.pop_front() {
                self.start_playback(slot);
            }
        }

        let mut started = Vec::new();
        for slot in self.queue.iter_mut() {
            if self.synthesis.len() >= self.parallelism {
                break;
            }
            if slot.state != ChunkState::Pending {
                continue;
            }
            slot.state = ChunkState::Synthesizing;
            started.push((slot.id, slot.chunk.index));
            let output = slot.limits.work_dir.join(format!(
                "speechmod-{}-{}-{}.{}",
                std::process::id(),
                slot.id,
                slot.chunk.index,
                self.backend.artifact_extension()
            ));
            let task = self.synthesis.spawn(synthesize(
                Arc::clone(&self.backend),
                slot.id,
                slot.chunk.clone(),
                output,
                slot.limits.synthesis_timeout,
                self.cancel.subscribe(),
            ));
            self.synthesizing.insert(task.id(), (slot.id, slot.chunk.index));
        }
        for (id, index) in started {
            self.emit(id, index, ChunkState::Synthesizing);
        }

        self.publish();
    }

    fn start_playback(&mut self, mut slot: Slot) {
        let Some(artifact) = slot.artifact.take() else {
            warn!(slot = slot.id, "ready slot without artifact");
            self.emit(slot.id, slot.chunk.index, ChunkState::Cancelled);
            return;
        };
        debug!(
            slot = slot.id,
            index = slot.chunk.index,
            path = %artifact.path().display(),
            "playing"
        );
        let handle = tokio::spawn(play(
            Arc::clone(&self.backend),
            artifact,
            slot.limits.playback_timeout,
            self.cancel.subscribe(),
        ));
        self.playback = Some(ActivePlayback {
            slot: slot.id,
            index: slot.chunk.index,
            cancelled: false,
            handle,
        });
        self.emit(slot.id, slot.chunk.index, ChunkState::Playing);
    }

    fn on_synthesized(&mut self, joined: Result<(Id, SynthReport), JoinError>) {
        let report = match joined {
            Ok((id, report)) => {
                self.synthesizing.remove(&id);
                report
            }
            Err(e) => {
                let Some((slot, index)) = self.synthesizing.remove(&e.id()) else {
                    error!(error = %e, "unknown synthesis task failed");
                    return;
                };
                error!(slot, index, error = %e, "synthesis task failed");
                let reason =
                    if e.is_panic() { "synthesis task panicked" } else { "synthesis task aborted" };
                SynthReport { slot, index, outcome: SynthOutcome::Failed(reason.to_string()) }
            }
        };
        let Some(pos) = self.queue.iter().position(|s| s.id == report.slot) else {
            // Cancelled while the task was running; a late artifact is
            // deleted with the report.
            return;
        };

        match report.outcome {
            SynthOutcome::Ready(artifact) => {
                let slot = &mut self.queue[pos];
                slot.state = ChunkState::Ready;
                slot.artifact = Some(artifact);
                self.emit(report.slot, report.index, ChunkState::Ready);
            }
            SynthOutcome::Failed(reason) => {
                self.queue.remove(pos);
                self.emit(report.slot, report.index, ChunkState::Cancelled);
                let err = SpeechError::SynthesisFailure { index: report.index, reason };
                warn!(slot = report.slot, error = %err, "skipping chunk");
                self.record(err.to_string());
            }
            SynthOutcome::Cancelled => {
                self.queue.remove(pos);
                self.emit(report.slot, report.index, ChunkState::Cancelled);
            }
        }
    }

    fn on_played(&mut self, joined: Result<PlayOutcome, JoinError>) {
        let Some(active) = self.playback.take() else {
            return;
        };
        let outcome = joined.unwrap_or_else(|e| {
            error!(error = %e, "playback task failed");
            PlayOutcome::Failed(e.to_string())
        });
        if active.cancelled {
            debug!(slot = active.slot, "cancelled player reaped");
            return;
        }
        match outcome {
            PlayOutcome::Done => self.emit(active.slot, active.index, ChunkState::Done),
            PlayOutcome::Failed(reason) => {
                self.emit(active.slot, active.index, ChunkState::Cancelled);
                let err = SpeechError::PlaybackFailure { index: active.index, reason };
                warn!(slot = active.slot, error = %err, "skipping chunk");
                self.record(err.to_string());
            }
            PlayOutcome::Cancelled => self.emit(active.slot, active.index, ChunkState::Cancelled),
        }
    }

    /// When the front slot is ready but held back by its delay.
    fn playback_deadline(&self) -> Option<Instant> {
        if self.playback.is_some() {
            return None;
        }
        self.queue
            .front()
            .filter(|s| s.state == ChunkState::Ready)
            .map(|s| s.not_before)
    }

    fn record(&mut self, message: String) {
        self.last_error = Some(message);
        self.publish();
    }

    fn emit(&self, slot: u64, index: usize, state: ChunkState) {
        debug!(slot, index, ?state, "chunk transition");
        let _ = self.events.send(ChunkEvent { slot, index, state });
    }

    fn publish(&self) {
        let playing = self.playback.as_ref().map_or(false, |p| !p.cancelled);
        let state = if playing {
            QueueStatus::Playing
        } else if !self.queue.is_empty() {
            QueueStatus::Synthesizing
        } else {
            QueueStatus::Idle
        };
        let next = StatusSnapshot {
            state,
            queued: self.queue.len(),
            last_error: self.last_error.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn join_playback(active: &mut Option<ActivePlayback>) -> Result<PlayOutcome, JoinError> {
    match active {
        Some(active) => (&mut active.handle).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

async fn synthesize(
    backend: Arc<dyn SpeechBackend>,
    slot: u64,
    chunk: TextChunk,
    output: PathBuf,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> SynthReport {
    // Guards the output path from the start, so partial files go too.
    let artifact = SynthesizedArtifact::new(output);
    let synthesized =
        run_synthesis(backend.as_ref(), &chunk, artifact.path(), timeout, &mut cancel).await;
    let outcome = match synthesized {
        Ok(()) => SynthOutcome::Ready(artifact),
        Err(outcome) => outcome,
    };
    SynthReport { slot, index: chunk.index, outcome }
}

/// `Ok` once a valid artifact sits at `output`.
async fn run_synthesis(
    backend: &dyn SpeechBackend,
    chunk: &TextChunk,
    output: &Path,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> std::result::Result<(), SynthOutcome> {
    if let Some(dir) = output.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SynthOutcome::Failed(format!("cannot create {}: {e}", dir.display())))?;
    }
    let cmd = backend.synthesis_command(&chunk.content, &chunk.profile, output);
    match process::supervise(cmd, timeout, cancel).await {
        Ok(ProcessOutcome::Success) => {
            process::validate_artifact(output).map_err(|e| SynthOutcome::Failed(format!("{e:#}")))
        }
        Ok(ProcessOutcome::Failed { status, stderr }) => {
            Err(SynthOutcome::Failed(describe_failure(status, &stderr)))
        }
        Ok(ProcessOutcome::Cancelled) => Err(SynthOutcome::Cancelled),
        Ok(ProcessOutcome::TimedOut(after)) => {
            Err(SynthOutcome::Failed(format!("timed out after {after:?}")))
        }
        Err(e) => Err(SynthOutcome::Failed(format!("{e:#}"))),
    }
}

/// Play `artifact` to the end; the artifact is deleted when this returns.
async fn play(
    backend: Arc<dyn SpeechBackend>,
    artifact: SynthesizedArtifact,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> PlayOutcome {
    let cmd = backend.playback_command(artifact.path());
    match process::supervise(cmd, timeout, &mut cancel).await {
        Ok(ProcessOutcome::Success) => PlayOutcome::Done,
        Ok(ProcessOutcome::Failed { status, stderr }) => {
            PlayOutcome::Failed(describe_failure(status, &stderr))
        }
        Ok(ProcessOutcome::Cancelled) => PlayOutcome::Cancelled,
        Ok(ProcessOutcome::TimedOut(after)) => {
            PlayOutcome::Failed(format!("timed out after {after:?}"))
        }
        Err(e) => PlayOutcome::Failed(format!("{e:#}")),
    }
}

fn describe_failure(status: std::process::ExitStatus, stderr: &str) -> String {
    if stderr.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {stderr}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
