use super::super::{CompletionOutcome, TransactionEngine};
use super::transitions::{advance, finish};
use crate::task::{Role, Task, TaskState, TerminalResult, TransitionError};
use ap2_mandate::token::{security_error, FIELD};
use ap2_mandate::{
    Aggregator, ErrorBand, ErrorCode, MandateKind, ParsedToken, ValidationError, ValidationResult,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

/// Folds check results, skipping the rest once fail-fast has tripped.
struct Checks {
    aggregator: Aggregator,
    result: ValidationResult,
    open: bool,
}

impl Checks {
    fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            result: ValidationResult::valid(),
            open: true,
        }
    }

    fn open(&self) -> bool {
        self.open
    }

    fn push(&mut self, next: ValidationResult) {
        if self.open {
            self.open = self.aggregator.absorb(&mut self.result, next);
        }
    }
}

pub(crate) async fn complete_impl(
    engine: &TransactionEngine,
    task_id: &str,
    caller: Role,
    now: DateTime<Utc>,
) -> Result<CompletionOutcome, TransitionError> {
    let slot = engine.slot(task_id)?;
    let mut task = slot.lock().await;

    if let Some(outcome) = &task.outcome {
        tracing::debug!(task_id, state = %outcome.state, "completion replayed");
        return Ok(CompletionOutcome::Replayed(outcome.clone()));
    }
    task.ensure_owner(caller)?;
    task.ensure_state(TaskState::Working, "complete")?;
    if task.artifacts.is_empty() {
        return Err(TransitionError::NoMandates {
            task_id: task.id.clone(),
        });
    }

    let result = if engine.failures.is_limited(&task.context_id) {
        tracing::warn!(
            reason = "W_RATE_LIMIT",
            task_id,
            context_id = %task.context_id,
            "security failure threshold reached"
        );
        ValidationResult::failure(security_error(
            engine.auth.config(),
            ErrorCode::RateLimitExceeded,
            "Too many failed authorization attempts",
        ))
    } else {
        evaluate(engine, &task, now).await
    };

    if result.is_valid {
        advance(engine, &mut task, TaskState::Completed, None)?;
        let outcome = TerminalResult {
            state: TaskState::Completed,
            message: completion_message(&task),
            result,
            cancelled: false,
            decided_at: now,
        };
        finish(engine, &mut task, outcome.clone());
        return Ok(CompletionOutcome::Completed(outcome));
    }

    if result.is_inconclusive() {
        tracing::warn!(
            reason = "W_COMPLETE_DEFERRED",
            task_id,
            codes = ?result.codes(),
            "completion deferred on system error"
        );
        return Ok(CompletionOutcome::Deferred(result));
    }

    if result.has_band(ErrorBand::Security) && !result.has_code(ErrorCode::RateLimitExceeded) {
        let count = engine.failures.record(&task.context_id);
        tracing::warn!(
            reason = "W_SECURITY_FAILURE",
            task_id,
            context_id = %task.context_id,
            count,
            "security failure recorded"
        );
    }

    advance(engine, &mut task, TaskState::Failed, None)?;
    let message = result
        .first_error()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "Validation failed".to_string());
    let outcome = TerminalResult {
        state: TaskState::Failed,
        message,
        result,
        cancelled: false,
        decided_at: now,
    };
    finish(engine, &mut task, outcome.clone());
    Ok(CompletionOutcome::Failed(outcome))
}

fn completion_message(task: &Task) -> String {
    if task.latest(MandateKind::Payment).is_some() {
        "Payment authorized".to_string()
    } else {
        "All mandates validated".to_string()
    }
}

/// Every check a task must pass to complete. Each payment mandate on the task
/// is checked against the cart and its own token. Nonces are claimed last so
/// a rejected attempt never burns them.
async fn evaluate(engine: &TransactionEngine, task: &Task, now: DateTime<Utc>) -> ValidationResult {
    let mut checks = Checks::new(Aggregator::new(engine.mode));

    for artifact in &task.artifacts {
        if !checks.open() {
            break;
        }
        checks.push(engine.mandates.validate_mandate_at(&artifact.mandate, now));
    }

    let intent = task.latest(MandateKind::Intent).map(|a| a.mandate.body());
    let cart = task.latest(MandateKind::Cart).map(|a| a.mandate.body());
    let payments: Vec<&Value> = task
        .artifacts
        .iter()
        .filter(|a| a.kind() == MandateKind::Payment)
        .map(|a| a.mandate.body())
        .collect();

    if let Some(cart) = cart {
        for payment in &payments {
            if checks.open() {
                checks.push(engine.mandates.validate_payment_against_cart(payment, cart));
            }
        }
    }
    if let (Some(cart), Some(intent)) = (cart, intent) {
        if checks.open() {
            checks.push(engine.mandates.validate_cart_against_intent(cart, intent, now));
        }
    }

    let mut tokens: Vec<ParsedToken> = Vec::with_capacity(payments.len());
    for payment in &payments {
        if !checks.open() {
            break;
        }
        let absent = Value::Null;
        let credential = payment.get(FIELD).unwrap_or(&absent);
        let inspection = engine
            .auth
            .authorize_at(credential, engine.verifier.as_ref(), now)
            .await;
        checks.push(inspection.result);
        if let Some(parsed) = inspection.parsed {
            if checks.open() {
                checks.push(engine.auth.bind_transaction(&parsed, payment));
            }
            tokens.push(parsed);
        }
    }

    if !engine.rules.is_empty() {
        for artifact in &task.artifacts {
            if !checks.open() {
                break;
            }
            checks.push(
                engine
                    .rules
                    .evaluate(&artifact.mandate.to_data_part(), engine.mode),
            );
        }
    }

    if checks.result.is_valid && !tokens.is_empty() {
        checks.push(claim_nonces(engine, task, &tokens));
    }

    checks.result
}

/// Claims every token nonce, refusing a nonce shared by two payments of the
/// same task before touching the store.
fn claim_nonces(
    engine: &TransactionEngine,
    task: &Task,
    tokens: &[ParsedToken],
) -> ValidationResult {
    let mut seen = HashSet::new();
    if tokens.iter().any(|t| !seen.insert(t.claims.nonce.as_str())) {
        return replayed(engine, task);
    }
    for parsed in tokens {
        let claimed = claim_nonce(engine, task, parsed);
        if !claimed.is_valid {
            return claimed;
        }
    }
    ValidationResult::valid()
}

fn replayed(engine: &TransactionEngine, task: &Task) -> ValidationResult {
    tracing::warn!(
        reason = "W_AUTH_REPLAY",
        task_id = %task.id,
        context_id = %task.context_id,
        "authorization token nonce reused"
    );
    ValidationResult::failure(
        security_error(
            engine.auth.config(),
            ErrorCode::ReplayDetected,
            "Authorization token has already been used",
        )
        .at(format!("{}.payload.nonce", FIELD)),
    )
}

fn claim_nonce(engine: &TransactionEngine, task: &Task, parsed: &ParsedToken) -> ValidationResult {
    let nonce_path = format!("{}.payload.nonce", FIELD);
    match engine.nonces.claim(&parsed.claims.nonce, &task.context_id, parsed.claims.exp) {
        Ok(true) => ValidationResult::valid(),
        Ok(false) => replayed(engine, task),
        Err(e) => {
            tracing::error!(error = %e, task_id = %task.id, "nonce store failed");
            ValidationResult::failure(
                ValidationError::new(ErrorCode::InternalError, "Replay protection is unavailable")
                    .at(nonce_path)
                    .suggest("Retry the request later"),
            )
        }
    }
}
