use super::walk;
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use crate::fields::FieldValidator;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

pub(crate) const EXPIRY: &str = "intent_expiry";

const AGENT_DID: &str = "agent_did";
const DELEGATION_DEPTH: &str = "delegation_depth";
const SESSION: &str = "session_authorization";
const MAX_DELEGATION_DEPTH: u64 = 5;
const KNOWN_DID_METHODS: [&str; 4] = ["kite", "web", "ethr", "key"];
const SESSION_STATUSES: [&str; 4] = ["active", "expired", "revoked", "suspended"];

pub(crate) fn validate_intent_impl(
    fields: &FieldValidator,
    intent: &Value,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut result = ValidationResult::valid();
    let Some(obj) = walk::object(intent, "", &mut result) else {
        return result;
    };

    let expiry = walk::required_timestamp(obj, EXPIRY, "", &mut result);
    if let Some(expiry) = expiry {
        check_not_expired(expiry, now, &mut result);
    }

    walk::required_text(fields, obj, "natural_language_description", "", &mut result);

    let confirmation_required =
        walk::optional_bool(obj, "user_cart_confirmation_required", "", true, &mut result);
    let merchants = walk::optional_string_list(fields, obj, "merchants", "", &mut result);
    let skus = walk::optional_string_list(fields, obj, "skus", "", &mut result);
    walk::optional_bool(obj, "requires_refundability", "", false, &mut result);

    check_delegation_depth(obj, &mut result);
    let agent_did = walk::optional(obj, AGENT_DID).and_then(|v| check_agent_did(v, &mut result));

    if confirmation_required {
        if walk::optional(obj, SESSION).is_some() {
            result.add_warning(
                "Session authorization provided for human-present flow (will be ignored)",
            );
        }
    } else {
        if walk::optional(obj, AGENT_DID).is_none() {
            result.add_error(required_for_autonomy(
                AGENT_DID,
                "Agent DID required for human-not-present flows",
            ));
        }
        match walk::optional(obj, SESSION) {
            None => result.add_error(required_for_autonomy(
                SESSION,
                "Session authorization required for human-not-present flows",
            )),
            Some(session) => check_session(session, agent_did, expiry, now, &mut result),
        }

        let unconstrained = |list: &Option<Vec<String>>| !matches!(list, Some(l) if !l.is_empty());
        if unconstrained(&merchants) && unconstrained(&skus) {
            result.add_warning(
                "No merchant or SKU constraints defined for autonomous flow - consider adding constraints",
            );
        }
    }

    result
}

fn required_for_autonomy(path: &str, message: &str) -> ValidationError {
    ValidationError::new(ErrorCode::MissingRequiredField, message)
        .at(path)
        .suggest("Set user_cart_confirmation_required to true, or delegate through a session")
}

fn check_delegation_depth(obj: &Map<String, Value>, result: &mut ValidationResult) {
    let Some(value) = walk::optional(obj, DELEGATION_DEPTH) else {
        return;
    };
    match value.as_u64() {
        Some(depth) if (1..=MAX_DELEGATION_DEPTH).contains(&depth) => {}
        Some(_) => result.add_error(
            ValidationError::new(
                ErrorCode::InvalidFieldFormat,
                format!("Delegation depth must be between 1 and {}", MAX_DELEGATION_DEPTH),
            )
            .at(DELEGATION_DEPTH)
            .with_value(value)
            .suggest("Reduce the number of agents between the user and the purchase"),
        ),
        None => result.add_error(walk::wrong_type(DELEGATION_DEPTH, "a whole number", value)),
    }
}

/// `did:<method>:<identifier>`. Returns the DID when well formed.
fn check_agent_did<'v>(value: &'v Value, result: &mut ValidationResult) -> Option<&'v str> {
    let Some(did) = value.as_str() else {
        result.add_error(walk::wrong_type(AGENT_DID, "a string", value));
        return None;
    };
    let mut parts = did.splitn(3, ':');
    let (scheme, method, identifier) = (parts.next(), parts.next(), parts.next());
    let well_formed = scheme == Some("did")
        && method.is_some_and(|m| !m.is_empty())
        && identifier.is_some_and(|i| !i.is_empty());
    if !well_formed {
        result.add_error(
            ValidationError::new(
                ErrorCode::InvalidFieldFormat,
                "Agent DID must have the form did:<method>:<identifier>",
            )
            .at(AGENT_DID)
            .with_value(value)
            .suggest("Use a DID such as did:web:agent.example"),
        );
        return None;
    }
    if let Some(method) = method.filter(|m| !KNOWN_DID_METHODS.contains(m)) {
        result.add_warning(format!(
            "Agent DID method '{}' may not be supported (supported: {})",
            method,
            KNOWN_DID_METHODS.join(", ")
        ));
    }
    Some(did)
}

fn check_session(
    session: &Value,
    agent_did: Option<&str>,
    intent_expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    result: &mut ValidationResult,
) {
    let Some(obj) = walk::object(session, SESSION, result) else {
        return;
    };
    walk::required_str(obj, "session_id", SESSION, result);
    let session_agent = walk::required_str(obj, AGENT_DID, SESSION, result);
    let session_expiry = walk::required_timestamp(obj, "session_expiry", SESSION, result);

    let status_path = join_path(SESSION, "status");
    let status = match walk::required(obj, "status", SESSION, result) {
        Some(Value::String(s)) if SESSION_STATUSES.contains(&s.as_str()) => Some(s.as_str()),
        Some(other) => {
            result.add_error(
                ValidationError::new(ErrorCode::InvalidFieldFormat, "Unknown session status")
                    .at(&status_path)
                    .with_value(other)
                    .suggest(format!("Use one of: {}", SESSION_STATUSES.join(", "))),
            );
            None
        }
        None => None,
    };

    if let Some(status) = status.filter(|s| *s != "active") {
        result.add_error(session_error(
            format!("Session authorization status is {}", status),
            status_path,
        ));
    } else if let Some(expiry) = session_expiry.filter(|e| now > *e) {
        result.add_error(session_error(
            format!("Session authorization expired at {}", expiry.to_rfc3339()),
            join_path(SESSION, "session_expiry"),
        ));
    }

    if let (Some(expected), Some(actual)) = (agent_did, session_agent) {
        if expected != actual {
            tracing::warn!(
                reason = "W_SESSION_AGENT",
                "session agent does not match intent agent"
            );
            result.add_error(session_error(
                "Session authorization agent DID does not match mandate agent DID".to_string(),
                join_path(SESSION, AGENT_DID),
            ));
        }
    }

    if let (Some(session_expiry), Some(intent_expiry)) = (session_expiry, intent_expiry) {
        if session_expiry > intent_expiry {
            result.add_warning("Session authorization expires after intent mandate");
        }
    }

    let has_intents = obj
        .get("intents")
        .and_then(Value::as_array)
        .is_some_and(|list| !list.is_empty());
    if !has_intents {
        result.add_warning("Session authorization has no specific intents defined");
    }
}

fn session_error(message: String, path: String) -> ValidationError {
    ValidationError::new(ErrorCode::AuthorizationFailed, message)
        .at(path)
        .suggest("Ask the user to open a new session for the agent")
}

/// `INTENT_EXPIRED` unless `expiry` is strictly after `now`.
pub(crate) fn check_not_expired(
    expiry: DateTime<Utc>,
    now: DateTime<Utc>,
    result: &mut ValidationResult,
) {
    if now >= expiry {
        result.add_error(
            ValidationError::new(
                ErrorCode::IntentExpired,
                format!("Intent mandate expired at {}", expiry.to_rfc3339()),
            )
            .at(EXPIRY)
            .with_value(&json!(expiry.to_rfc3339()))
            .suggest("Ask the user to confirm a new intent"),
        );
    }
}
