use super::{security_error, TokenClaims, FIELD};
use crate::config::ValidationConfig;
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

fn claim_path(claim: &str) -> String {
    join_path(&join_path(FIELD, "payload"), claim)
}

fn missing_claim(claim: &str) -> ValidationError {
    ValidationError::new(
        ErrorCode::MissingRequiredField,
        format!("Authorization token is missing the '{}' claim", claim),
    )
    .at(claim_path(claim))
    .suggest(format!("Include '{}' in the token payload", claim))
}

fn malformed_claim(claim: &str, expected: &str, found: &Value) -> ValidationError {
    ValidationError::new(
        ErrorCode::InvalidFieldFormat,
        format!("Claim '{}' must be {}", claim, expected),
    )
    .at(claim_path(claim))
    .with_value(found)
    .suggest(format!("Encode '{}' as {}", claim, expected))
}

/// Numeric date as whole seconds since the epoch.
fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
}

/// Required and optional claims. Returns the claims only when every
/// required one is present and well-typed.
pub(crate) fn check_claims_impl(
    config: &ValidationConfig,
    payload: &Map<String, Value>,
    now: DateTime<Utc>,
    result: &mut ValidationResult,
) -> Option<TokenClaims> {
    let transaction_data = match payload.get("transaction_data") {
        None | Some(Value::Null) => {
            result.add_error(missing_claim("transaction_data"));
            None
        }
        Some(value) => {
            let hashes: Option<Vec<String>> = value.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|h| h.as_str().filter(|s| !s.is_empty()).map(str::to_string))
                    .collect()
            });
            match hashes {
                Some(h) if !h.is_empty() => Some(h),
                _ => {
                    result.add_error(malformed_claim(
                        "transaction_data",
                        "a non-empty array of non-empty strings",
                        value,
                    ));
                    None
                }
            }
        }
    };

    let nonce = match payload.get("nonce") {
        None | Some(Value::Null) => {
            result.add_error(missing_claim("nonce"));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            result.add_error(missing_claim("nonce"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            result.add_error(malformed_claim("nonce", "a string", other));
            None
        }
    };

    let skew = config.clock_skew_seconds as i64;
    let exp = match payload.get("exp") {
        None | Some(Value::Null) => {
            result.add_error(missing_claim("exp"));
            None
        }
        Some(value) => match numeric_date(value) {
            Some(exp) => {
                if exp.saturating_add(skew) <= now.timestamp() {
                    tracing::warn!(reason = "W_AUTH_EXP", exp, "authorization token expired");
                    result.add_error(
                        security_error(
                            config,
                            ErrorCode::AuthorizationFailed,
                            "Authorization token has expired",
                        )
                        .at(claim_path("exp")),
                    );
                }
                Some(exp)
            }
            None => {
                result.add_error(malformed_claim("exp", "a numeric date", value));
                None
            }
        },
    };

    let aud = audiences(payload.get("aud"));
    if let Some(expected) = &config.expected_audience {
        if !aud.iter().any(|a| a == expected) {
            tracing::warn!(reason = "W_AUTH_AUD", expected = %expected, "audience mismatch");
            result.add_error(
                security_error(
                    config,
                    ErrorCode::AuthorizationFailed,
                    "Authorization token is not intended for this recipient",
                )
                .at(claim_path("aud")),
            );
        }
    }

    let iat = payload.get("iat").and_then(numeric_date);
    match iat {
        None => result.add_warning("Authorization token has no 'iat' claim"),
        Some(iat) if iat > now.timestamp().saturating_add(skew) => {
            result.add_warning("Authorization token 'iat' is in the future");
        }
        Some(_) => {}
    }

    Some(TokenClaims {
        transaction_data: transaction_data?,
        nonce: nonce?,
        exp: exp?,
        aud,
        iat,
    })
}

/// `aud` may be a single string or an array of strings.
fn audiences(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
