//! Boolean-or-error wrappers for callers that predate structured results.

use crate::errors::{ErrorCode, ValidationResult};
use crate::token::{AuthorizationValidator, FIELD};
use serde_json::Value;

/// The first error of a failed result; `Display` is its message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct LegacyValidationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationResult {
    /// `Ok(())` when valid, else the first error.
    pub fn into_legacy(self) -> Result<(), LegacyValidationError> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(LegacyValidationError {
                code: first.code,
                message: first.message,
            }),
        }
    }
}

/// Check the `user_authorization` of a raw payment mandate (format, algorithm
/// policy, claims). Signature verification needs the async
/// [`AuthorizationValidator::authorize`].
pub fn validate_payment_mandate_signature(
    validator: &AuthorizationValidator,
    payment: &Value,
) -> Result<(), LegacyValidationError> {
    let absent = Value::Null;
    let credential = payment.get(FIELD).unwrap_or(&absent);
    validator.inspect(credential).result.into_legacy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::errors::ValidationError;
    use serde_json::json;

    #[test]
    fn test_into_legacy() {
        assert_eq!(ValidationResult::valid().into_legacy(), Ok(()));

        let mut r = ValidationResult::failure(ValidationError::new(
            ErrorCode::InvalidAmount,
            "Amount must not be negative",
        ));
        r.add_error(ValidationError::new(ErrorCode::Timeout, "later"));
        let err = r.into_legacy().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAmount);
        assert_eq!(err.to_string(), "Amount must not be negative");
    }

    #[test]
    fn test_missing_authorization() {
        let v = AuthorizationValidator::new(ValidationConfig::default()).unwrap();
        let err = validate_payment_mandate_signature(&v, &json!({"amount": {}})).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthorizationFailed);
        assert_eq!(err.to_string(), "User authorization not found in PaymentMandate");
    }

    #[test]
    fn test_object_authorization_is_rejected() {
        let v = AuthorizationValidator::new(ValidationConfig::default()).unwrap();
        let payment = json!({"user_authorization": {"signature": "sig", "timestamp": 1}});
        let err = validate_payment_mandate_signature(&v, &payment).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthorizationFailed);
    }

    #[test]
    fn test_none_algorithm_message() {
        let v = AuthorizationValidator::new(ValidationConfig::default()).unwrap();
        let payment = json!({"user_authorization": "eyJhbGciOiJub25lIn0.eyJhbWl9.c2ln"});
        let err = validate_payment_mandate_signature(&v, &payment).unwrap_err();
        assert_eq!(err.code, ErrorCode::SignatureInvalid);
        assert_eq!(err.to_string(), "Algorithm 'none' is not allowed");
    }
}
