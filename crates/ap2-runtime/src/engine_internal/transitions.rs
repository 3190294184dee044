use super::super::{TaskSlot, TransactionEngine};
use crate::events::TaskEvent;
use crate::task::{
    MandateArtifact, Role, Task, TaskMessage, TaskState, TerminalResult, TransitionError,
};
use ap2_mandate::{MandateObject, ValidationResult};
use chrono::Utc;
use std::sync::{Arc, PoisonError};
use uuid::Uuid;

pub(crate) fn create_task_impl(engine: &TransactionEngine, context_id: &str, owner: Role) -> Task {
    let task = Task::new(format!("task-{}", Uuid::new_v4()), context_id, owner);
    let snapshot = task.clone();
    {
        let mut tasks = engine.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let slot: TaskSlot = Arc::new(tokio::sync::Mutex::new(task));
        tasks.insert(snapshot.id.clone(), slot);
    }
    tracing::info!(task_id = %snapshot.id, context_id, owner = %owner, "task created");
    engine.emit(TaskEvent::status(
        &snapshot.id,
        &snapshot.context_id,
        TaskState::Created,
        None,
    ));
    snapshot
}

/// Move `task` to `next` and announce it. Terminal states are announced by
/// the caller with the full outcome.
pub(crate) fn advance(
    engine: &TransactionEngine,
    task: &mut Task,
    next: TaskState,
    message: Option<String>,
) -> Result<(), TransitionError> {
    let from = task.state;
    task.transition(next)?;
    tracing::info!(task_id = %task.id, from = %from, to = %next, "task transition");
    if !next.is_terminal() {
        engine.emit(TaskEvent::status(&task.id, &task.context_id, next, message));
    }
    Ok(())
}

/// Record a terminal outcome on a task whose state was already advanced.
pub(crate) fn finish(engine: &TransactionEngine, task: &mut Task, outcome: TerminalResult) {
    task.history
        .push(TaskMessage::new(task.owner, outcome.message.clone()));
    engine.emit(TaskEvent::terminal(&task.id, &task.context_id, &outcome));
    task.outcome = Some(outcome);
}

pub(crate) async fn submit_impl(
    engine: &TransactionEngine,
    task_id: &str,
    message: TaskMessage,
) -> Result<Task, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    task.ensure_owner(message.role)?;
    advance(engine, &mut task, TaskState::Submitted, Some(message.text.clone()))?;
    task.history.push(message);
    Ok(task.clone())
}

pub(crate) async fn start_working_impl(
    engine: &TransactionEngine,
    task_id: &str,
    caller: Role,
) -> Result<Task, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    task.ensure_owner(caller)?;
    advance(engine, &mut task, TaskState::Working, None)?;
    Ok(task.clone())
}

pub(crate) async fn attach_mandate_impl(
    engine: &TransactionEngine,
    task_id: &str,
    caller: Role,
    mandate: MandateObject,
) -> Result<MandateArtifact, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    task.ensure_owner(caller)?;
    task.ensure_state(TaskState::Working, "attach a mandate")?;

    let validation = engine.mandates.validate_mandate(&mandate);
    if !validation.is_valid {
        tracing::info!(
            task_id,
            kind = %mandate.kind(),
            errors = validation.errors.len(),
            "attached mandate failed validation"
        );
    }
    let artifact = MandateArtifact {
        artifact_id: format!("artifact-{}", Uuid::new_v4()),
        mandate,
        validation,
    };
    task.artifacts.push(artifact.clone());
    engine.emit(TaskEvent::artifact(&task.id, &task.context_id, &artifact));
    Ok(artifact)
}

pub(crate) async fn request_input_impl(
    engine: &TransactionEngine,
    task_id: &str,
    caller: Role,
    message: &str,
) -> Result<Task, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    task.ensure_owner(caller)?;
    advance(
        engine,
        &mut task,
        TaskState::InputRequired,
        Some(message.to_string()),
    )?;
    task.history.push(TaskMessage::new(caller, message));
    Ok(task.clone())
}

pub(crate) async fn resume_impl(
    engine: &TransactionEngine,
    task_id: &str,
    reply: TaskMessage,
) -> Result<Task, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    task.ensure_owner(reply.role)?;
    task.ensure_state(TaskState::InputRequired, "resume")?;
    advance(engine, &mut task, TaskState::Working, Some(reply.text.clone()))?;
    task.history.push(reply);
    Ok(task.clone())
}

pub(crate) async fn handoff_impl(
    engine: &TransactionEngine,
    task_id: &str,
    caller: Role,
    to: Role,
) -> Result<Task, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    if task.state.is_terminal() {
        return Err(TransitionError::Terminal {
            task_id: task.id.clone(),
            state: task.state,
        });
    }
    task.ensure_owner(caller)?;

    let note = format!("Handed off to {}", to);
    tracing::info!(task_id, from = %caller, to = %to, "task handed off");
    task.owner = to;
    task.history.push(TaskMessage::new(caller, note.clone()));
    engine.emit(TaskEvent::status(
        &task.id,
        &task.context_id,
        task.state,
        Some(note),
    ));
    Ok(task.clone())
}

pub(crate) async fn cancel_impl(
    engine: &TransactionEngine,
    task_id: &str,
    caller: Role,
    reason: Option<&str>,
) -> Result<TerminalResult, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;
    task.ensure_owner(caller)?;
    advance(engine, &mut task, TaskState::Failed, None)?;

    let message = match reason {
        Some(r) if !r.trim().is_empty() => format!("Task cancelled: {}", r.trim()),
        _ => "Task cancelled".to_string(),
    };
    let outcome = TerminalResult {
        state: TaskState::Failed,
        message,
        result: ValidationResult::valid(),
        cancelled: true,
        decided_at: Utc::now(),
    };
    finish(engine, &mut task, outcome.clone());
    Ok(outcome)
}
