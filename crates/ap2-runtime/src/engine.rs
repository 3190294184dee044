//! Transaction engine: drives tasks through their lifecycle.
//!
//! Completion flow:
//! 1. Terminal task: return the recorded result (no re-validation, no events)
//! 2. Caller must own the task, which must be `working` and carry mandates
//! 3. Rate-limited context: fail without contacting the verifier
//! 4. Structural validation of every artifact
//! 5. Every payment vs the cart, cart vs intent
//! 6. For every payment: authorization token (verifier under timeout), and
//!    binding of the token to both the cart and that payment
//! 7. Registered rules
//! 8. Nonce claims, only once everything else passed
//!
//! Transitions of one task are serialized by its own async mutex; the task
//! registry lock is held only for lookup, insert and eviction.
//!
//! Retention: tasks stay in memory until [`TransactionEngine::evict_terminal`]
//! drops the terminal ones, and claimed nonces stay in the store until
//! [`TransactionEngine::purge_nonces`] drops those whose token has expired.

use crate::config::RuntimeConfig;
use crate::events::{FileTaskEmitter, NullTaskEmitter, TaskEvent, TaskEventEmitter};
use crate::guard::{
    GuardError, MemoryNonceStore, NonceStore, SecurityFailureTracker, SqliteNonceStore,
};
use crate::task::{
    MandateArtifact, Role, Task, TaskMessage, TaskState, TerminalResult, TransitionError,
};
use anyhow::Context as _;
use ap2_mandate::{
    AggregationMode, AuthorizationValidator, ConfigError, MandateObject, MandateValidator,
    RuleRegistry, SignatureVerifier, ValidationConfig, ValidationResult,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[path = "engine_internal/mod.rs"]
mod engine_internal;

/// Result of a completion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The task moved to `completed`.
    Completed(TerminalResult),
    /// The task moved to `failed`.
    Failed(TerminalResult),
    /// The task was already terminal; this is the original result.
    Replayed(TerminalResult),
    /// Only system-band errors: the task stays `working` and may be retried.
    Deferred(ValidationResult),
}

impl CompletionOutcome {
    pub fn terminal(&self) -> Option<&TerminalResult> {
        match self {
            Self::Completed(t) | Self::Failed(t) | Self::Replayed(t) => Some(t),
            Self::Deferred(_) => None,
        }
    }

    pub fn result(&self) -> &ValidationResult {
        match self {
            Self::Completed(t) | Self::Failed(t) | Self::Replayed(t) => &t.result,
            Self::Deferred(r) => r,
        }
    }

    pub fn is_completed(&self) -> bool {
        match self {
            Self::Completed(_) => true,
            Self::Replayed(t) => t.state == TaskState::Completed,
            _ => false,
        }
    }
}

type TaskSlot = Arc<tokio::sync::Mutex<Task>>;

pub struct TransactionEngine {
    tasks: Mutex<HashMap<String, TaskSlot>>,
    mandates: MandateValidator,
    auth: AuthorizationValidator,
    verifier: Arc<dyn SignatureVerifier>,
    emitter: Arc<dyn TaskEventEmitter>,
    rules: RuleRegistry,
    nonces: Arc<dyn NonceStore>,
    failures: SecurityFailureTracker,
    mode: AggregationMode,
}

impl TransactionEngine {
    /// Engine with in-memory guards and no event sink.
    pub fn new(
        config: ValidationConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, ConfigError> {
        let shared = Arc::new(config);
        Ok(Self {
            tasks: Mutex::new(HashMap::new()),
            mandates: MandateValidator::from_shared(Arc::clone(&shared))?,
            auth: AuthorizationValidator::from_shared(shared)?,
            verifier,
            emitter: Arc::new(NullTaskEmitter),
            rules: RuleRegistry::new(),
            nonces: Arc::new(MemoryNonceStore::new()),
            failures: SecurityFailureTracker::new(
                crate::config::DEFAULT_SECURITY_FAILURE_THRESHOLD,
            ),
            mode: AggregationMode::CollectAll,
        })
    }

    /// Engine wired from a [`RuntimeConfig`]: opens the nonce database and
    /// event log when configured.
    pub fn from_config(
        config: RuntimeConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> anyhow::Result<Self> {
        let mut engine = Self::new(config.validation, verifier)
            .context("invalid validation config")?
            .with_failure_threshold(config.security_failure_threshold)
            .with_mode(config.completion_mode);
        if let Some(path) = &config.nonce_db {
            let store = SqliteNonceStore::open(path)
                .with_context(|| format!("failed to open nonce store {}", path.display()))?;
            engine = engine.with_nonce_store(Arc::new(store));
        }
        if let Some(path) = &config.event_log {
            let emitter = FileTaskEmitter::new(path)
                .with_context(|| format!("failed to open event log {}", path.display()))?;
            engine = engine.with_emitter(Arc::new(emitter));
        }
        Ok(engine)
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn TaskEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Rules run against each artifact's data part at completion.
    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failures = SecurityFailureTracker::new(threshold);
        self
    }

    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mandates(&self) -> &MandateValidator {
        &self.mandates
    }

    pub fn failures(&self) -> &SecurityFailureTracker {
        &self.failures
    }

    /// New task in `created`, owned by `owner`.
    pub fn create_task(&self, context_id: &str, owner: Role) -> Task {
        engine_internal::transitions::create_task_impl(self, context_id, owner)
    }

    /// Snapshot of a task.
    pub async fn task(&self, task_id: &str) -> Result<Task, TransitionError> {
        let slot = self.slot(task_id)?;
        let task = slot.lock().await;
        Ok(task.clone())
    }

    /// `created → submitted`. The message's role must own the task.
    pub async fn submit(
        &self,
        task_id: &str,
        message: TaskMessage,
    ) -> Result<Task, TransitionError> {
        engine_internal::transitions::submit_impl(self, task_id, message).await
    }

    /// `submitted → working`.
    pub async fn start_working(
        &self,
        task_id: &str,
        caller: Role,
    ) -> Result<Task, TransitionError> {
        engine_internal::transitions::start_working_impl(self, task_id, caller).await
    }

    /// Attach a mandate to a `working` task. The returned artifact carries the
    /// structural validation result; invalid mandates are kept and fail the
    /// task at completion.
    pub async fn attach_mandate(
        &self,
        task_id: &str,
        caller: Role,
        mandate: MandateObject,
    ) -> Result<MandateArtifact, TransitionError> {
        engine_internal::transitions::attach_mandate_impl(self, task_id, caller, mandate).await
    }

    /// Attach every mandate found in a data part, in intent, cart, payment order.
    pub async fn attach_data_part(
        &self,
        task_id: &str,
        caller: Role,
        part: &Value,
    ) -> Result<Vec<MandateArtifact>, TransitionError> {
        let mut attached = Vec::new();
        for mandate in MandateObject::from_data_part(part) {
            attached.push(self.attach_mandate(task_id, caller, mandate).await?);
        }
        Ok(attached)
    }

    /// `working → input-required` with a caller-facing message.
    pub async fn request_input(
        &self,
        task_id: &str,
        caller: Role,
        message: &str,
    ) -> Result<Task, TransitionError> {
        engine_internal::transitions::request_input_impl(self, task_id, caller, message).await
    }

    /// `input-required → working` with the caller's reply.
    pub async fn resume(&self, task_id: &str, reply: TaskMessage) -> Result<Task, TransitionError> {
        engine_internal::transitions::resume_impl(self, task_id, reply).await
    }

    /// Transfer ownership of a non-terminal task.
    pub async fn handoff(
        &self,
        task_id: &str,
        caller: Role,
        to: Role,
    ) -> Result<Task, TransitionError> {
        engine_internal::transitions::handoff_impl(self, task_id, caller, to).await
    }

    /// `working | input-required → failed`, marked as cancelled.
    pub async fn cancel(
        &self,
        task_id: &str,
        caller: Role,
        reason: Option<&str>,
    ) -> Result<TerminalResult, TransitionError> {
        engine_internal::transitions::cancel_impl(self, task_id, caller, reason).await
    }

    pub async fn complete(
        &self,
        task_id: &str,
        caller: Role,
    ) -> Result<CompletionOutcome, TransitionError> {
        self.complete_at(task_id, caller, Utc::now()).await
    }

    /// Like [`complete`](Self::complete) with an explicit `now`.
    pub async fn complete_at(
        &self,
        task_id: &str,
        caller: Role,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, TransitionError> {
        engine_internal::complete::complete_impl(self, task_id, caller, now).await
    }

    /// Drop terminal tasks decided before `decided_before`. Tasks in use by a
    /// concurrent operation are kept. Returns how many were dropped.
    pub fn evict_terminal(&self, decided_before: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, slot| match slot.try_lock() {
            Ok(task) => !task
                .outcome
                .as_ref()
                .is_some_and(|o| o.decided_at < decided_before),
            Err(_) => true,
        });
        let evicted = before - tasks.len();
        if evicted > 0 {
            tracing::debug!(evicted, "terminal tasks evicted");
        }
        evicted
    }

    /// Drop claimed nonces whose token can no longer pass the expiry check
    /// at `now`.
    pub fn purge_nonces(&self, now: DateTime<Utc>) -> Result<usize, GuardError> {
        let skew = i64::try_from(self.auth.config().clock_skew_seconds).unwrap_or(i64::MAX);
        let purged = self
            .nonces
            .purge_expired(now.timestamp().saturating_sub(skew))?;
        tracing::debug!(purged, "expired nonces purged");
        Ok(purged)
    }

    fn slot(&self, task_id: &str) -> Result<TaskSlot, TransitionError> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownTask {
                task_id: task_id.to_string(),
            })
    }

    fn emit(&self, event: TaskEvent) {
        self.emitter.emit(&event);
    }
}
