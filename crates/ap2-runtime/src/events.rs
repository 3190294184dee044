//! Task events: status updates and artifact notifications.
//!
//! Emission is fire-and-forget. An emitter must never fail a transaction.

use crate::task::{MandateArtifact, TaskState, TerminalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    Status {
        task_id: String,
        context_id: String,
        state: TaskState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Set on the single event announcing a terminal state.
        #[serde(rename = "final")]
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<TerminalResult>,
        at: DateTime<Utc>,
    },
    Artifact {
        task_id: String,
        context_id: String,
        artifact: MandateArtifact,
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn status(
        task_id: &str,
        context_id: &str,
        state: TaskState,
        message: Option<String>,
    ) -> Self {
        Self::Status {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            state,
            message,
            is_final: false,
            outcome: None,
            at: Utc::now(),
        }
    }

    pub fn terminal(task_id: &str, context_id: &str, outcome: &TerminalResult) -> Self {
        Self::Status {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            state: outcome.state,
            message: Some(outcome.message.clone()),
            is_final: true,
            outcome: Some(outcome.clone()),
            at: outcome.decided_at,
        }
    }

    pub fn artifact(task_id: &str, context_id: &str, artifact: &MandateArtifact) -> Self {
        Self::Artifact {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            artifact: artifact.clone(),
            at: Utc::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Status { task_id, .. } | Self::Artifact { task_id, .. } => task_id,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Status { is_final: true, .. })
    }
}

/// Sink for task events.
pub trait TaskEventEmitter: Send + Sync {
    fn emit(&self, event: &TaskEvent);
}

/// File-based emitter (NDJSON, one event per line).
pub struct FileTaskEmitter {
    file: Mutex<std::fs::File>,
}

impl FileTaskEmitter {
    pub fn new(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TaskEventEmitter for FileTaskEmitter {
    fn emit(&self, event: &TaskEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(reason = "W_EVENT_ENCODE", error = %e, "dropping task event");
                return;
            }
        };
        if let Ok(mut f) = self.file.lock() {
            if let Err(e) = writeln!(f, "{}", json) {
                tracing::warn!(reason = "W_EVENT_WRITE", error = %e, "dropping task event");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Default)]
pub struct MemoryTaskEmitter {
    events: Mutex<Vec<TaskEvent>>,
}

impl MemoryTaskEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, task_id: &str) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id() == task_id)
            .collect()
    }

    pub fn take(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl TaskEventEmitter for MemoryTaskEmitter {
    fn emit(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Discards everything.
pub struct NullTaskEmitter;

impl TaskEventEmitter for NullTaskEmitter {
    fn emit(&self, _event: &TaskEvent) {}
}
