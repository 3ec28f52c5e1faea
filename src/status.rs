//! Read-only view of the queue for the host's status line.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Idle,
    /// Chunks are queued or being synthesised; nothing is audible.
    Synthesizing,
    Playing,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
        })
    }
}

/// Everything the status line shows, published by the queue worker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatusSnapshot {
    pub state: QueueStatus,
    /// Chunks waiting behind the one playing (or all of them when idle).
    pub queued: usize,
    /// Most recent warning or failure, kept until replaced.
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    pub fn message(&self) -> String {
        let base = match self.state {
            QueueStatus::Idle => "Ready".to_string(),
            QueueStatus::Synthesizing => format!("Synthesizing ({} queued)", self.queued),
            QueueStatus::Playing => format!("Playing ({} queued)", self.queued),
        };
        match &self.last_error {
            Some(err) => format!("{base}; last error: {err}"),
            None => base,
        }
    }
}

/// Cheap clonable reader over the worker's published [`StatusSnapshot`].
#[derive(Debug, Clone)]
pub struct StatusReporter {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusReporter {
    /// Sender half for the publisher and the reporter reading from it.
    pub(crate) fn channel() -> (watch::Sender<StatusSnapshot>, Self) {
        let (tx, rx) = watch::channel(StatusSnapshot::default());
        (tx, Self { rx })
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    pub fn status(&self) -> QueueStatus {
        self.rx.borrow().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.rx.borrow().last_error.clone()
    }

    pub fn message(&self) -> String {
        self.rx.borrow().message()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// Returns `None` once the publisher is gone without the predicate
    /// holding.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&StatusSnapshot) -> bool,
    ) -> Option<StatusSnapshot> {
        let mut rx = self.rx.clone();
        let snapshot = rx.wait_for(predicate).await.ok()?;
        Some(snapshot.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
