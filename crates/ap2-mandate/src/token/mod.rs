//! Authorization token validation.
//!
//! The `user_authorization` credential of a payment mandate is a compact
//! `header.payload.signature` token, base64url-encoded. Checks run in this
//! order and stop at the first structural failure:
//!
//! 1. The credential is a string
//! 2. Exactly three non-empty segments
//! 3. Header and payload decode to JSON objects
//! 4. Header hardening and algorithm policy, before any claim is read
//! 5. Required claims: `transaction_data`, `nonce`, `exp` (plus `aud` when configured)
//! 6. Signature verification, delegated to a [`SignatureVerifier`] under a timeout
//!
//! Malformed input never errors or panics; every outcome is a
//! [`ValidationResult`].

mod claims;
mod header;
mod verifier;


pub use verifier::{SignatureVerifier, VerificationRequest, VerifierError};

use crate::config::{ConfigError, ValidationConfig};
use crate::digest::compute_payment_reference_value;
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Field path of the credential inside a payment mandate.
pub const FIELD: &str = "user_authorization";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Hashes of the mandates this token authorizes (cart, payment).
    pub transaction_data: Vec<String>,
    pub nonce: String,
    pub exp: i64,
    #[serde(default)]
    pub aud: Vec<String>,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// A token that passed every check short of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub header: TokenHeader,
    pub claims: TokenClaims,
    signing_input: String,
    signature: String,
}

impl ParsedToken {
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn verification_request(&self) -> VerificationRequest {
        VerificationRequest {
            algorithm: self.header.alg.clone(),
            key_id: self.header.kid.clone(),
            signing_input: self.signing_input.as_bytes().to_vec(),
            signature: self.signature.clone(),
        }
    }

    /// Whether the token authorizes the mandate with this reference.
    pub fn covers(&self, reference: &str) -> bool {
        self.claims.transaction_data.iter().any(|h| h == reference)
    }
}

/// Outcome of inspecting (and optionally verifying) a credential.
#[derive(Debug, Clone)]
pub struct TokenInspection {
    pub result: ValidationResult,
    /// Present only when `result` is valid.
    pub parsed: Option<ParsedToken>,
}

impl TokenInspection {
    fn rejected(result: ValidationResult) -> Self {
        Self {
            result,
            parsed: None,
        }
    }
}

/// Security-band error with the generic remedy only.
pub fn security_error(
    config: &ValidationConfig,
    code: ErrorCode,
    message: impl Into<String>,
) -> ValidationError {
    let example = config
        .accepted_algorithms
        .first()
        .map(String::as_str)
        .unwrap_or("ES256");
    ValidationError::new(code, message).suggest(format!(
        "Use a signed token with an accepted algorithm such as {}",
        example
    ))
}

#[derive(Debug, Clone)]
pub struct AuthorizationValidator {
    config: Arc<ValidationConfig>,
}

impl AuthorizationValidator {
    pub fn new(config: ValidationConfig) -> Result<Self, ConfigError> {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<ValidationConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn inspect(&self, credential: &Value) -> TokenInspection {
        self.inspect_at(credential, Utc::now())
    }

    /// Format, algorithm policy and claims. No signature verification.
    pub fn inspect_at(&self, credential: &Value, now: DateTime<Utc>) -> TokenInspection {
        let config = &*self.config;
        let mut result = ValidationResult::valid();

        let token = match credential {
            Value::String(s) => s.as_str(),
            Value::Null => {
                tracing::warn!(reason = "W_AUTH_MISSING", "user authorization not found");
                result.add_error(
                    security_error(
                        config,
                        ErrorCode::AuthorizationFailed,
                        "User authorization not found in PaymentMandate",
                    )
                    .at(FIELD),
                );
                return TokenInspection::rejected(result);
            }
            _ => {
                tracing::warn!(reason = "W_AUTH_TYPE", "user authorization is not a string token");
                result.add_error(
                    security_error(
                        config,
                        ErrorCode::AuthorizationFailed,
                        "User authorization must be a compact token string",
                    )
                    .at(FIELD),
                );
                return TokenInspection::rejected(result);
            }
        };

        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature] = segments.as_slice() else {
            return self.malformed(result, "Authorization token must have three segments");
        };
        if header_b64.is_empty() || payload_b64.is_empty() || signature.is_empty() {
            return self.malformed(result, "Authorization token has an empty segment");
        }

        let Some(header_obj) = header::decode_object(header_b64) else {
            return self.malformed(result, "Authorization token header is not valid base64url JSON");
        };
        let Some(token_header) = header::check_header_impl(config, &header_obj, &mut result)
        else {
            return TokenInspection::rejected(result);
        };

        let Some(payload) = header::decode_object(payload_b64) else {
            return self.malformed(
                result,
                "Authorization token payload is not valid base64url JSON",
            );
        };
        let token_claims = claims::check_claims_impl(config, &payload, now, &mut result);

        match token_claims {
            Some(claims) if result.is_valid => TokenInspection {
                result,
                parsed: Some(ParsedToken {
                    header: token_header,
                    claims,
                    signing_input: format!("{}.{}", header_b64, payload_b64),
                    signature: (*signature).to_string(),
                }),
            },
            _ => TokenInspection::rejected(result),
        }
    }

    pub async fn authorize(
        &self,
        credential: &Value,
        verifier: &dyn SignatureVerifier,
    ) -> TokenInspection {
        self.authorize_at(credential, verifier, Utc::now()).await
    }

    /// Full check including signature verification. The verifier is the only
    /// suspension point and is bounded by `verifier_timeout_ms`.
    pub async fn authorize_at(
        &self,
        credential: &Value,
        verifier: &dyn SignatureVerifier,
        now: DateTime<Utc>,
    ) -> TokenInspection {
        let mut inspection = self.inspect_at(credential, now);
        let Some(parsed) = inspection.parsed.take() else {
            return inspection;
        };

        let request = parsed.verification_request();
        let timeout = self.config.verifier_timeout();
        let mut result = inspection.result;

        match tokio::time::timeout(timeout, verifier.verify(&request)).await {
            Ok(Ok(true)) => {
                tracing::debug!(alg = %parsed.header.alg, "authorization token verified");
                return TokenInspection {
                    result,
                    parsed: Some(parsed),
                };
            }
            Ok(Ok(false)) => {
                tracing::warn!(
                    reason = "W_AUTH_SIG",
                    alg = %parsed.header.alg,
                    "signature rejected"
                );
                result.add_error(
                    security_error(
                        &self.config,
                        ErrorCode::SignatureInvalid,
                        "Authorization token signature is invalid",
                    )
                    .at(join_path(FIELD, "signature")),
                );
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "signature verifier failed");
                result.add_error(
                    ValidationError::new(
                        ErrorCode::ServiceUnavailable,
                        "Signature verification is unavailable",
                    )
                    .at(FIELD)
                    .suggest("Retry the request later"),
                );
            }
            Err(_) => {
                tracing::warn!(
                    reason = "W_AUTH_TIMEOUT",
                    timeout_ms = self.config.verifier_timeout_ms,
                    "signature verification timed out"
                );
                result.add_error(
                    ValidationError::new(ErrorCode::Timeout, "Signature verification timed out")
                        .at(FIELD)
                        .suggest("Retry the request later"),
                );
            }
        }

        TokenInspection::rejected(result)
    }

    /// The token must list both the payment's `cart_reference` and the
    /// payment's own reference in its `transaction_data`, so it authorizes
    /// this amount via this method for this cart.
    pub fn bind_transaction(&self, parsed: &ParsedToken, payment: &Value) -> ValidationResult {
        let mut result = ValidationResult::valid();
        let path = join_path(&join_path(FIELD, "payload"), "transaction_data");

        let cart_reference = payment.get("cart_reference").and_then(Value::as_str);
        if !cart_reference.is_some_and(|r| parsed.covers(r)) {
            tracing::warn!(
                reason = "W_AUTH_BINDING",
                "authorization token does not cover the signed cart"
            );
            result.add_error(
                security_error(
                    &self.config,
                    ErrorCode::AuthorizationFailed,
                    "Authorization token does not authorize this cart",
                )
                .at(path.clone()),
            );
        }

        match compute_payment_reference_value(payment) {
            Ok(reference) if parsed.covers(&reference) => {}
            Ok(_) => {
                tracing::warn!(
                    reason = "W_AUTH_BINDING",
                    "authorization token does not cover the payment mandate"
                );
                result.add_error(
                    security_error(
                        &self.config,
                        ErrorCode::AuthorizationFailed,
                        "Authorization token does not authorize this payment",
                    )
                    .at(path),
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to compute payment reference");
                result.add_error(
                    ValidationError::new(
                        ErrorCode::InternalError,
                        "Unable to compute the payment reference",
                    )
                    .at(path)
                    .suggest("Retry the request"),
                );
            }
        }
        result
    }

    fn malformed(&self, mut result: ValidationResult, message: &str) -> TokenInspection {
        tracing::warn!(reason = "W_AUTH_FORMAT", "{}", message);
        result.add_error(
            security_error(&self.config, ErrorCode::SignatureInvalid, message).at(FIELD),
        );
        TokenInspection::rejected(result)
    }
}
