//! Transaction task model and lifecycle states.
//!
//! ```text
//! created ──▶ submitted ──▶ working ──▶ completed
//!                             │  ▲  │
//!                             ▼  │  └──▶ failed
//!                        input-required ──▶ failed (cancel)
//! ```
//!
//! `completed` and `failed` are terminal: no outgoing transitions.

use ap2_mandate::{MandateKind, MandateObject, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Created,
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States reachable in one step.
    pub fn successors(&self) -> &'static [TaskState] {
        match self {
            Self::Created => &[Self::Submitted],
            Self::Submitted => &[Self::Working],
            Self::Working => &[Self::InputRequired, Self::Completed, Self::Failed],
            Self::InputRequired => &[Self::Working, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        self.successors().contains(&next)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant roles in a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Shopper,
    Merchant,
    CredentialsProvider,
    PaymentProcessor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shopper => "shopper",
            Self::Merchant => "merchant",
            Self::CredentialsProvider => "credentials_provider",
            Self::PaymentProcessor => "payment_processor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            data: None,
            at: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A mandate attached to a task, with its validation at attach time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandateArtifact {
    pub artifact_id: String,
    pub mandate: MandateObject,
    pub validation: ValidationResult,
}

impl MandateArtifact {
    pub fn kind(&self) -> MandateKind {
        self.mandate.kind()
    }
}

/// The decision recorded when a task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult {
    pub state: TaskState,
    pub message: String,
    pub result: ValidationResult,
    #[serde(default)]
    pub cancelled: bool,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub state: TaskState,
    /// Only the owner may drive the task.
    pub owner: Role,
    pub history: Vec<TaskMessage>,
    pub artifacts: Vec<MandateArtifact>,
    pub outcome: Option<TerminalResult>,
}

impl Task {
    pub fn new(id: impl Into<String>, context_id: impl Into<String>, owner: Role) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            state: TaskState::Created,
            owner,
            history: Vec::new(),
            artifacts: Vec::new(),
            outcome: None,
        }
    }

    /// Most recently attached mandate of `kind`.
    pub fn latest(&self, kind: MandateKind) -> Option<&MandateArtifact> {
        self.artifacts.iter().rev().find(|a| a.kind() == kind)
    }

    pub(crate) fn ensure_owner(&self, caller: Role) -> Result<(), TransitionError> {
        if caller != self.owner {
            return Err(TransitionError::NotOwner {
                task_id: self.id.clone(),
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_state(
        &self,
        expected: TaskState,
        operation: &'static str,
    ) -> Result<(), TransitionError> {
        if self.state != expected {
            return Err(TransitionError::WrongState {
                task_id: self.id.clone(),
                state: self.state,
                operation,
            });
        }
        Ok(())
    }

    pub(crate) fn transition(&mut self, next: TaskState) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Terminal {
                task_id: self.id.clone(),
                state: self.state,
            });
        }
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::IllegalTransition {
                task_id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Task not found: {task_id}")]
    UnknownTask { task_id: String },

    #[error("Task {task_id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task {task_id} is already {state}")]
    Terminal { task_id: String, state: TaskState },

    #[error("Task {task_id} is owned by {owner}, not {caller}")]
    NotOwner {
        task_id: String,
        owner: Role,
        caller: Role,
    },

    #[error("Task {task_id}: cannot {operation} while {state}")]
    WrongState {
        task_id: String,
        state: TaskState,
        operation: &'static str,
    },

    #[error("Task {task_id} has no mandates to authorize")]
    NoMandates { task_id: String },
}
