//! Error taxonomy and structured validation results.
//!
//! Every caller-facing failure carries exactly one [`ErrorCode`]. Codes live
//! in four numeric bands and are rendered on the wire as `"AP2_" + 4 digits`:
//!
//! | Band | Range | Meaning | Caller recovery |
//! |------|-------|---------|-----------------|
//! | Validation | 1000-1999 | malformed, missing, out of range | resubmit |
//! | Business | 2000-2999 | policy violation | choose different inputs |
//! | Security | 3000-3999 | authorization / signature failure | never silently retried |
//! | System | 4000-4999 | timeout, internal fault | retry with backoff |
//!
//! Codes are additive: a number is never reassigned to a different meaning.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Wire prefix for error code strings.
pub const ERROR_CODE_PREFIX: &str = "AP2_";

/// Longest string preview echoed back in `invalid_value`.
const PREVIEW_CHARS: usize = 50;

/// Error band (the thousands digit of the code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorBand {
    /// Malformed field, missing required field, out-of-range value.
    Validation,
    /// Policy violation: limits, unsupported currency, expired intent.
    BusinessLogic,
    /// Authorization failed, signature invalid, insecure algorithm, rate limited.
    Security,
    /// Timeout or internal fault.
    System,
}

impl ErrorBand {
    /// Classify a raw numeric code without knowing the individual code.
    ///
    /// Anything outside the first three bands is treated as a system fault.
    pub fn from_number(code: u16) -> Self {
        match code / 1000 {
            1 => Self::Validation,
            2 => Self::BusinessLogic,
            3 => Self::Security,
            _ => Self::System,
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl fmt::Display for ErrorBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::BusinessLogic => "business_logic",
            Self::Security => "security",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// Stable error codes (closed, versioned enumeration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ErrorCode {
    // Validation
    InvalidPaymentRequest = 1001,
    InvalidCurrencyCode = 1002,
    InvalidAmount = 1003,
    InvalidPaymentMethod = 1004,
    InvalidShippingAddress = 1005,
    InvalidMandateSignature = 1006,
    MissingRequiredField = 1007,
    InvalidFieldFormat = 1008,
    // Business logic
    AmountExceedsLimit = 2001,
    CurrencyNotSupported = 2002,
    PaymentMethodNotAccepted = 2003,
    ShippingNotAvailable = 2004,
    DuplicateTransaction = 2005,
    ExpiredPaymentRequest = 2006,
    IntentExpired = 2007,
    CartTotalMismatch = 2008,
    MerchantNotAllowed = 2009,
    RefundabilityRequired = 2010,
    CurrencyMismatch = 2011,
    // Security
    AuthorizationFailed = 3001,
    SignatureInvalid = 3002,
    RateLimitExceeded = 3003,
    SuspiciousActivity = 3004,
    ReplayDetected = 3005,
    // System
    InternalError = 4001,
    ServiceUnavailable = 4002,
    Timeout = 4003,
    NetworkError = 4004,
}

impl ErrorCode {
    /// Every defined code, in numeric order.
    pub const ALL: [ErrorCode; 28] = [
        Self::InvalidPaymentRequest,
        Self::InvalidCurrencyCode,
        Self::InvalidAmount,
        Self::InvalidPaymentMethod,
        Self::InvalidShippingAddress,
        Self::InvalidMandateSignature,
        Self::MissingRequiredField,
        Self::InvalidFieldFormat,
        Self::AmountExceedsLimit,
        Self::CurrencyNotSupported,
        Self::PaymentMethodNotAccepted,
        Self::ShippingNotAvailable,
        Self::DuplicateTransaction,
        Self::ExpiredPaymentRequest,
        Self::IntentExpired,
        Self::CartTotalMismatch,
        Self::MerchantNotAllowed,
        Self::RefundabilityRequired,
        Self::CurrencyMismatch,
        Self::AuthorizationFailed,
        Self::SignatureInvalid,
        Self::RateLimitExceeded,
        Self::SuspiciousActivity,
        Self::ReplayDetected,
        Self::InternalError,
        Self::ServiceUnavailable,
        Self::Timeout,
        Self::NetworkError,
    ];

    /// Numeric code.
    pub fn number(self) -> u16 {
        self as u16
    }

    /// Band this code belongs to.
    pub fn band(self) -> ErrorBand {
        ErrorBand::from_number(self.number())
    }

    /// Symbolic name, e.g. `INVALID_CURRENCY_CODE`.
    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidPaymentRequest => "INVALID_PAYMENT_REQUEST",
            Self::InvalidCurrencyCode => "INVALID_CURRENCY_CODE",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidPaymentMethod => "INVALID_PAYMENT_METHOD",
            Self::InvalidShippingAddress => "INVALID_SHIPPING_ADDRESS",
            Self::InvalidMandateSignature => "INVALID_MANDATE_SIGNATURE",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::InvalidFieldFormat => "INVALID_FIELD_FORMAT",
            Self::AmountExceedsLimit => "AMOUNT_EXCEEDS_LIMIT",
            Self::CurrencyNotSupported => "CURRENCY_NOT_SUPPORTED",
            Self::PaymentMethodNotAccepted => "PAYMENT_METHOD_NOT_ACCEPTED",
            Self::ShippingNotAvailable => "SHIPPING_NOT_AVAILABLE",
            Self::DuplicateTransaction => "DUPLICATE_TRANSACTION",
            Self::ExpiredPaymentRequest => "EXPIRED_PAYMENT_REQUEST",
            Self::IntentExpired => "INTENT_EXPIRED",
            Self::CartTotalMismatch => "CART_TOTAL_MISMATCH",
            Self::MerchantNotAllowed => "MERCHANT_NOT_ALLOWED",
            Self::RefundabilityRequired => "REFUNDABILITY_REQUIRED",
            Self::CurrencyMismatch => "CURRENCY_MISMATCH",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }

    /// Wire string, e.g. `AP2_1002`.
    pub fn as_wire(self) -> String {
        format!("{}{:04}", ERROR_CODE_PREFIX, self.number())
    }

    /// Look up a code by number.
    pub fn from_number(number: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.number() == number)
    }

    /// Parse a wire string (`AP2_3002`).
    pub fn from_wire(s: &str) -> Option<Self> {
        let digits = s.strip_prefix(ERROR_CODE_PREFIX)?;
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().and_then(Self::from_number)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", ERROR_CODE_PREFIX, self.number())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_wire())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_wire(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code: {}", s)))
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "error_code")]
    pub code: ErrorCode,

    pub message: String,

    /// Dotted path to the failing input (`contents.line_items[1].amount.value`),
    /// empty when the failure concerns the whole object.
    #[serde(default)]
    pub field_path: String,

    /// Offending value, truncated for long strings.
    #[serde(default)]
    pub invalid_value: Option<serde_json::Value>,

    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field_path: String::new(),
            invalid_value: None,
            suggestions: Vec::new(),
        }
    }

    /// Set the field path.
    pub fn at(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = field_path.into();
        self
    }

    /// Attach the offending value. Strings longer than 50 chars are truncated.
    pub fn with_value(mut self, value: &serde_json::Value) -> Self {
        self.invalid_value = Some(preview(value));
        self
    }

    /// Add a human-actionable suggestion.
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn band(&self) -> ErrorBand {
        self.code.band()
    }

    /// Prefix the field path (`items[2]` + `amount.value`).
    pub(crate) fn nest_under(mut self, prefix: &str) -> Self {
        self.field_path = join_path(prefix, &self.field_path);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field_path.is_empty() {
            write!(f, "{}: {}", self.code, self.message)
        } else {
            write!(f, "{}: {} (at {})", self.code, self.message, self.field_path)
        }
    }
}

/// Outcome of validating one field, object or batch.
///
/// `is_valid` is false exactly when `errors` is non-empty; warnings never
/// affect validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

impl ValidationResult {
    /// Empty, passing result.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Result holding a single error.
    pub fn failure(error: ValidationError) -> Self {
        let mut result = Self::valid();
        result.add_error(error);
        result
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Append another result, preserving order.
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Append another result with every field path nested under `prefix`.
    pub fn merge_nested(&mut self, prefix: &str, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors
            .extend(other.errors.into_iter().map(|e| e.nest_under(prefix)));
        self.warnings.extend(other.warnings);
    }

    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Codes in error order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }

    pub fn has_band(&self, band: ErrorBand) -> bool {
        self.errors.iter().any(|e| e.band() == band)
    }

    /// True when the result failed only because of system-band errors
    /// (timeouts, unavailable collaborators): the input itself was not judged.
    pub fn is_inconclusive(&self) -> bool {
        !self.is_valid && self.errors.iter().all(|e| e.band() == ErrorBand::System)
    }
}

/// Join a base path and a child segment. Index segments (`[3]`) attach
/// without a dot.
pub fn join_path(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => base.to_string(),
        (false, false) if child.starts_with('[') => format!("{}{}", base, child),
        (false, false) => format!("{}.{}", base, child),
    }
}

fn preview(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.chars().count() > PREVIEW_CHARS => {
            let head: String = s.chars().take(PREVIEW_CHARS).collect();
            serde_json::Value::String(format!("{}...", head))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bands_follow_thousands_digit() {
        for code in ErrorCode::ALL {
            let expected = match code.number() {
                1000..=1999 => ErrorBand::Validation,
                2000..=2999 => ErrorBand::BusinessLogic,
                3000..=3999 => ErrorBand::Security,
                _ => ErrorBand::System,
            };
            assert_eq!(code.band(), expected, "{}", code.name());
        }
    }

    #[test]
    fn test_codes_are_unique() {
        let mut numbers: Vec<u16> = ErrorCode::ALL.iter().map(|c| c.number()).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), ErrorCode::ALL.len());
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(ErrorCode::InvalidCurrencyCode.as_wire(), "AP2_1002");
        assert_eq!(ErrorCode::SignatureInvalid.to_string(), "AP2_3002");
        assert_eq!(
            ErrorCode::from_wire("AP2_3001"),
            Some(ErrorCode::AuthorizationFailed)
        );
        assert_eq!(ErrorCode::from_wire("AP2_9999"), None);
        assert_eq!(ErrorCode::from_wire("AP2_30011"), None);
        assert_eq!(ErrorCode::from_wire("3001"), None);
    }

    #[test]
    fn test_band_from_unknown_number() {
        assert_eq!(ErrorBand::from_number(1999), ErrorBand::Validation);
        assert_eq!(ErrorBand::from_number(3500), ErrorBand::Security);
        assert_eq!(ErrorBand::from_number(4999), ErrorBand::System);
        assert!(ErrorBand::System.is_retryable());
        assert!(!ErrorBand::Security.is_retryable());
    }

    #[test]
    fn test_error_wire_format() {
        let err = ValidationError::new(ErrorCode::InvalidAmount, "Amount must not be negative")
            .at("amount.value")
            .with_value(&json!(-1.5))
            .suggest("Provide a non-negative amount");

        let wire = serde_json::to_value(&err).unwrap();
        assert_eq!(
            wire,
            json!({
                "error_code": "AP2_1003",
                "message": "Amount must not be negative",
                "field_path": "amount.value",
                "invalid_value": -1.5,
                "suggestions": ["Provide a non-negative amount"],
            })
        );

        let back: ValidationError = serde_json::from_value(wire).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_long_values_are_truncated() {
        let long = "x".repeat(500);
        let err = ValidationError::new(ErrorCode::InvalidFieldFormat, "too long")
            .with_value(&json!(long));
        let shown = err.invalid_value.unwrap();
        assert_eq!(shown.as_str().unwrap().chars().count(), 53);
        assert!(shown.as_str().unwrap().ends_with("..."));
    }

    #[test]
    fn test_merge_preserves_order_and_validity() {
        let mut a = ValidationResult::valid();
        a.add_warning("w1");

        let b = ValidationResult::failure(ValidationError::new(ErrorCode::InvalidAmount, "b"));
        let c = ValidationResult::failure(ValidationError::new(ErrorCode::Timeout, "c"));

        a.merge(b);
        a.merge(c);

        assert!(!a.is_valid);
        assert_eq!(a.codes(), vec![ErrorCode::InvalidAmount, ErrorCode::Timeout]);
        assert_eq!(a.warnings, vec!["w1".to_string()]);
    }

    #[test]
    fn test_merge_nested_prefixes_paths() {
        let child = ValidationResult::failure(
            ValidationError::new(ErrorCode::MissingRequiredField, "label is required").at("label"),
        );
        let mut parent = ValidationResult::valid();
        parent.merge_nested("items[3]", child);
        assert_eq!(parent.errors[0].field_path, "items[3].label");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "amount"), "amount");
        assert_eq!(join_path("total", ""), "total");
        assert_eq!(join_path("contents", "total"), "contents.total");
        assert_eq!(join_path("contents.line_items", "[0]"), "contents.line_items[0]");
    }

    #[test]
    fn test_inconclusive_only_for_system_band() {
        let timeout = ValidationResult::failure(ValidationError::new(ErrorCode::Timeout, "t"));
        assert!(timeout.is_inconclusive());

        let mut mixed = timeout.clone();
        mixed.add_error(ValidationError::new(ErrorCode::SignatureInvalid, "s"));
        assert!(!mixed.is_inconclusive());

        assert!(!ValidationResult::valid().is_inconclusive());
    }
}
