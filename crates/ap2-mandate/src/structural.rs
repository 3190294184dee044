//! Mandate structural validation.
//!
//! Checks the shape and internal consistency of one Intent, Cart or Payment
//! mandate at a time, accumulating every problem found rather than stopping
//! at the first. Input is decoded JSON so wrong types, missing fields and
//! empty objects are reported, never panicked on.
//!
//! Flow for a cart:
//! 1. Top-level fields (`cart_id`, `merchant_signature`, `timestamp`)
//! 2. Every line item and the total (label, amount, refund period)
//! 3. Currency agreement between items and total
//! 4. Sum invariant: `contents.total` equals the sum of line items
//!
//! Cross-mandate checks (payment against cart, cart against intent) are
//! separate entry points; the transaction engine runs them once every
//! mandate is known.

use crate::config::{ConfigError, ValidationConfig};
use crate::errors::ValidationResult;
use crate::fields::FieldValidator;
use crate::types::{CartMandate, IntentMandate, MandateObject, PaymentMandate, PaymentRequest};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

#[path = "structural_internal/mod.rs"]
mod structural_internal;

/// Validator for individual mandates. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct MandateValidator {
    fields: FieldValidator,
}

impl MandateValidator {
    pub fn new(config: ValidationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            fields: FieldValidator::new(config)?,
        })
    }

    pub fn from_shared(config: Arc<ValidationConfig>) -> Result<Self, ConfigError> {
        Ok(Self {
            fields: FieldValidator::from_shared(config)?,
        })
    }

    pub fn fields(&self) -> &FieldValidator {
        &self.fields
    }

    pub fn config(&self) -> &ValidationConfig {
        self.fields.config()
    }

    pub fn validate_intent(&self, intent: &Value) -> ValidationResult {
        self.validate_intent_at(intent, Utc::now())
    }

    /// Validate an intent as of `now`. Expired (`now >= expiry`) intents fail
    /// with `INTENT_EXPIRED` whatever else is wrong with them.
    pub fn validate_intent_at(&self, intent: &Value, now: DateTime<Utc>) -> ValidationResult {
        let result = structural_internal::intent::validate_intent_impl(&self.fields, intent, now);
        log_outcome("intent", &result);
        result
    }

    pub fn validate_cart(&self, cart: &Value) -> ValidationResult {
        let result = structural_internal::cart::validate_cart_impl(&self.fields, cart);
        log_outcome("cart", &result);
        result
    }

    pub fn validate_payment(&self, payment: &Value) -> ValidationResult {
        self.validate_payment_at(payment, Utc::now())
    }

    pub fn validate_payment_at(&self, payment: &Value, now: DateTime<Utc>) -> ValidationResult {
        let result =
            structural_internal::payment::validate_payment_impl(&self.fields, payment, now);
        log_outcome("payment", &result);
        result
    }

    /// A merchant's payment request: at least one payment method, a details
    /// id, a well-formed total and at most `max_line_items` display items.
    pub fn validate_payment_request(&self, request: &Value) -> ValidationResult {
        let result =
            structural_internal::request::validate_payment_request_impl(&self.fields, request);
        log_outcome("payment_request", &result);
        result
    }

    /// Validate a batch of line items; errors carry `items[i].…` paths in
    /// input order.
    pub fn validate_line_items(&self, items: &[Value]) -> ValidationResult {
        structural_internal::cart::validate_line_items_impl(&self.fields, items, "items").0
    }

    pub fn validate_mandate(&self, mandate: &MandateObject) -> ValidationResult {
        self.validate_mandate_at(mandate, Utc::now())
    }

    pub fn validate_mandate_at(
        &self,
        mandate: &MandateObject,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        match mandate {
            MandateObject::Intent(v) => self.validate_intent_at(v, now),
            MandateObject::Cart(v) => self.validate_cart(v),
            MandateObject::Payment(v) => self.validate_payment_at(v, now),
        }
    }

    /// Payment amount and `cart_reference` must match the referenced cart.
    /// Any disagreement is a security failure (`AUTHORIZATION_FAILED`).
    pub fn validate_payment_against_cart(&self, payment: &Value, cart: &Value) -> ValidationResult {
        structural_internal::cross::payment_against_cart_impl(&self.fields, payment, cart)
    }

    /// Cart must respect the intent's constraints: not expired, merchant
    /// allow-list, refundability.
    pub fn validate_cart_against_intent(
        &self,
        cart: &Value,
        intent: &Value,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        structural_internal::cross::cart_against_intent_impl(cart, intent, now)
    }

    pub fn validate_intent_mandate(&self, intent: &IntentMandate) -> ValidationResult {
        self.validate_typed(intent, |v| self.validate_intent(v))
    }

    pub fn validate_cart_mandate(&self, cart: &CartMandate) -> ValidationResult {
        self.validate_typed(cart, |v| self.validate_cart(v))
    }

    pub fn validate_payment_mandate(&self, payment: &PaymentMandate) -> ValidationResult {
        self.validate_typed(payment, |v| self.validate_payment(v))
    }

    pub fn validate_payment_request_typed(&self, request: &PaymentRequest) -> ValidationResult {
        self.validate_typed(request, |v| self.validate_payment_request(v))
    }

    fn validate_typed<T: serde::Serialize>(
        &self,
        typed: &T,
        validate: impl FnOnce(&Value) -> ValidationResult,
    ) -> ValidationResult {
        match serde_json::to_value(typed) {
            Ok(v) => validate(&v),
            Err(e) => structural_internal::walk::serialization_failure(&e),
        }
    }
}

fn log_outcome(kind: &str, result: &ValidationResult) {
    match result.first_error() {
        None => tracing::debug!(mandate = kind, warnings = result.warnings.len(), "mandate valid"),
        Some(first) => tracing::debug!(
            mandate = kind,
            errors = result.errors.len(),
            first = %first.code,
            "mandate invalid"
        ),
    }
}
