//! Field validators: currency codes, monetary amounts, free text.
//!
//! Pure and total: every check returns a [`ValidationResult`] and never fails
//! or panics, whatever the input.

use crate::config::{is_currency_shape, ConfigError, ValidationConfig};
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use crate::types::Money;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

/// Markup, quotes, backslash, C0/C1 control characters and DEL.
const INJECTION_PATTERN: &str = r#"[<>"'\\\x00-\x1f\x7f-\x9f]"#;

#[derive(Debug, Clone)]
pub struct FieldValidator {
    config: Arc<ValidationConfig>,
    injection: Regex,
}

impl FieldValidator {
    pub fn new(config: ValidationConfig) -> Result<Self, ConfigError> {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<ValidationConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        let injection =
            Regex::new(INJECTION_PATTERN).map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
        Ok(Self { config, injection })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<ValidationConfig> {
        Arc::clone(&self.config)
    }

    pub fn validate_currency(&self, code: &str, field_path: &str) -> ValidationResult {
        let mut result = ValidationResult::valid();

        if code.is_empty() {
            result.add_error(
                ValidationError::new(ErrorCode::MissingRequiredField, "Currency code is required")
                    .at(field_path)
                    .suggest("Provide a valid ISO 4217 currency code"),
            );
        } else if !is_currency_shape(code) || !self.config.supported_currencies.contains(code) {
            result.add_error(
                ValidationError::new(
                    ErrorCode::InvalidCurrencyCode,
                    format!("Invalid currency code: {}", code),
                )
                .at(field_path)
                .with_value(&json!(code))
                .suggest(self.currency_suggestion()),
            );
        }

        result
    }

    /// Validate `money` found at `field_path`; errors point at
    /// `<field_path>.currency` and `<field_path>.value`.
    pub fn validate_amount(&self, money: &Money, field_path: &str) -> ValidationResult {
        let mut result =
            self.validate_currency(&money.currency, &join_path(field_path, "currency"));
        result.merge(self.validate_amount_value(money.value, &join_path(field_path, "value")));
        result
    }

    /// Value-only half of [`Self::validate_amount`].
    pub fn validate_amount_value(&self, value: f64, field_path: &str) -> ValidationResult {
        let mut result = ValidationResult::valid();
        let max = self.config.max_amount;

        if !value.is_finite() {
            result.add_error(
                ValidationError::new(ErrorCode::InvalidAmount, "Amount must be a finite number")
                    .at(field_path)
                    .suggest("Provide a numeric value"),
            );
        } else if value < 0.0 {
            result.add_error(
                ValidationError::new(ErrorCode::InvalidAmount, "Amount must not be negative")
                    .at(field_path)
                    .with_value(&json!(value))
                    .suggest("Provide an amount of 0 or more"),
            );
        } else if value > max {
            result.add_error(
                ValidationError::new(
                    ErrorCode::AmountExceedsLimit,
                    format!("Amount exceeds maximum limit of {}", max),
                )
                .at(field_path)
                .with_value(&json!(value))
                .suggest(format!("Reduce amount to {} or less", max)),
            );
        }

        if value.is_finite() && decimal_places(value) > 2 {
            result.add_warning(format!("Amount has more than 2 decimal places: {}", value));
        }

        result
    }

    /// Bounded, injection-free free text. `max_len` counts characters.
    pub fn validate_string(
        &self,
        value: &str,
        field_path: &str,
        max_len: usize,
        required: bool,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();

        if value.is_empty() {
            if required {
                result.add_error(
                    ValidationError::new(
                        ErrorCode::MissingRequiredField,
                        format!("{} is required", display_name(field_path)),
                    )
                    .at(field_path)
                    .suggest("Provide a non-empty value"),
                );
            }
            return result;
        }

        if value.chars().count() > max_len {
            result.add_error(
                ValidationError::new(
                    ErrorCode::InvalidFieldFormat,
                    format!(
                        "{} exceeds maximum length of {}",
                        display_name(field_path),
                        max_len
                    ),
                )
                .at(field_path)
                .with_value(&json!(value))
                .suggest(format!("Reduce length to {} characters or less", max_len)),
            );
        }

        if self.injection.is_match(value) {
            result.add_error(
                ValidationError::new(
                    ErrorCode::InvalidFieldFormat,
                    format!("{} contains invalid characters", display_name(field_path)),
                )
                .at(field_path)
                .suggest("Remove special characters, quotes, and control characters"),
            );
        }

        result
    }

    /// [`Self::validate_string`] with the configured length limit.
    pub fn validate_text(&self, value: &str, field_path: &str, required: bool) -> ValidationResult {
        self.validate_string(value, field_path, self.config.max_string_length, required)
    }

    fn currency_suggestion(&self) -> String {
        let codes: Vec<&str> = self
            .config
            .supported_currencies
            .iter()
            .map(String::as_str)
            .collect();
        format!("Use one of: {}", codes.join(", "))
    }
}

fn display_name(field_path: &str) -> &str {
    if field_path.is_empty() {
        "value"
    } else {
        field_path
    }
}

/// Fractional digits in the shortest decimal representation of `value`.
fn decimal_places(value: f64) -> usize {
    let repr = value.to_string();
    match repr.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len(),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> FieldValidator {
        FieldValidator::new(ValidationConfig::default()).unwrap()
    }

    #[test]
    fn test_currency_accepts_supported() {
        let v = validator();
        for code in ["USD", "EUR", "JPY", "KRW"] {
            assert!(v.validate_currency(code, "currency").is_valid, "{}", code);
        }
    }

    #[test]
    fn test_currency_rejections() {
        let v = validator();

        let empty = v.validate_currency("", "amount.currency");
        assert_eq!(empty.codes(), vec![ErrorCode::MissingRequiredField]);
        assert_eq!(empty.errors[0].field_path, "amount.currency");

        for bad in ["usd", "US", "USDX", "XYZ", "U$D"] {
            let r = v.validate_currency(bad, "amount.currency");
            assert_eq!(r.codes(), vec![ErrorCode::InvalidCurrencyCode], "{}", bad);
            assert!(r.errors[0].suggestions[0].starts_with("Use one of: AUD, BRL"));
        }
    }

    #[test]
    fn test_amount_bounds() {
        let v = validator();
        assert!(v.validate_amount(&Money::new("USD", 0.0), "amount").is_valid);
        assert!(v.validate_amount(&Money::new("USD", 1_000_000.0), "amount").is_valid);

        let negative = v.validate_amount(&Money::new("USD", -0.01), "amount");
        assert_eq!(negative.codes(), vec![ErrorCode::InvalidAmount]);
        assert_eq!(negative.errors[0].field_path, "amount.value");

        let huge = v.validate_amount(&Money::new("USD", 1_000_000.01), "amount");
        assert_eq!(huge.codes(), vec![ErrorCode::AmountExceedsLimit]);

        let nan = v.validate_amount(&Money::new("USD", f64::NAN), "amount");
        assert_eq!(nan.codes(), vec![ErrorCode::InvalidAmount]);
        let inf = v.validate_amount(&Money::new("USD", f64::INFINITY), "amount");
        assert_eq!(inf.codes(), vec![ErrorCode::InvalidAmount]);
    }

    #[test]
    fn test_amount_reports_both_halves() {
        let r = validator().validate_amount(&Money::new("XXX", -3.0), "total.amount");
        assert_eq!(
            r.codes(),
            vec![ErrorCode::InvalidCurrencyCode, ErrorCode::InvalidAmount]
        );
        assert_eq!(r.errors[0].field_path, "total.amount.currency");
        assert_eq!(r.errors[1].field_path, "total.amount.value");
    }

    #[test]
    fn test_amount_precision_warning() {
        let v = validator();
        let r = v.validate_amount(&Money::new("USD", 19.999), "amount");
        assert!(r.is_valid);
        assert_eq!(r.warnings.len(), 1);

        assert!(v.validate_amount(&Money::new("USD", 19.99), "amount").warnings.is_empty());
        assert!(v.validate_amount(&Money::new("USD", 20.0), "amount").warnings.is_empty());
    }

    #[test]
    fn test_string_required_and_optional() {
        let v = validator();
        let missing = v.validate_string("", "label", 10, true);
        assert_eq!(missing.codes(), vec![ErrorCode::MissingRequiredField]);
        assert_eq!(missing.errors[0].field_path, "label");

        assert!(v.validate_string("", "label", 10, false).is_valid);
    }

    #[test]
    fn test_string_length_counts_chars() {
        let v = validator();
        assert!(v.validate_string("ééééé", "label", 5, true).is_valid);
        let r = v.validate_string("ééééééé", "label", 5, true);
        assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat]);
    }

    #[test]
    fn test_string_injection_characters() {
        let v = validator();
        for bad in [
            "<script>",
            "say \"hi\"",
            "it's",
            "a\\b",
            "line\nbreak",
            "nul\0",
            "del\u{7f}",
            "c1\u{85}",
        ] {
            let r = v.validate_string(bad, "description", 100, true);
            assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat], "{:?}", bad);
        }
        assert!(v
            .validate_string("Red running shoes, size 42 & socks", "description", 100, true)
            .is_valid);
    }

    #[test]
    fn test_oversized_injection_reports_both() {
        let r = validator().validate_string(&"<".repeat(20), "x", 5, true);
        assert_eq!(r.errors.len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let v = validator();
        let money = Money::new("usd", -1.0);
        assert_eq!(v.validate_amount(&money, "m"), v.validate_amount(&money, "m"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cfg = ValidationConfig {
            max_amount: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            FieldValidator::new(cfg),
            Err(ConfigError::InvalidMaxAmount(_))
        ));
    }
}
