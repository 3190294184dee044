use super::intent::check_not_expired;
use super::walk;
use crate::digest::compute_cart_reference_value;
use crate::errors::{ErrorCode, ValidationError, ValidationResult};
use crate::fields::FieldValidator;
use crate::types::Money;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

const REAUTHORIZE: &str = "Obtain a fresh user authorization for the current cart";

fn money_at(value: &Value, pointer: &str) -> Option<Money> {
    let m = value.pointer(pointer)?;
    Some(Money::new(
        m.get("currency")?.as_str()?,
        m.get("value")?.as_f64()?,
    ))
}

pub(crate) fn payment_against_cart_impl(
    fields: &FieldValidator,
    payment: &Value,
    cart: &Value,
) -> ValidationResult {
    let mut result = ValidationResult::valid();

    // Malformed amounts are reported by the structural walks.
    if let (Some(paid), Some(total)) = (
        money_at(payment, "/amount"),
        money_at(cart, "/contents/total/amount"),
    ) {
        let epsilon = fields.config().total_epsilon;
        if paid.currency != total.currency || (paid.value - total.value).abs() > epsilon {
            tracing::warn!(
                reason = "W_PAYMENT_AMOUNT",
                paid = paid.value,
                total = total.value,
                "payment amount does not match cart total"
            );
            result.add_error(
                ValidationError::new(
                    ErrorCode::AuthorizationFailed,
                    format!(
                        "Payment amount {:.2} {} does not match cart total {:.2} {}",
                        paid.value, paid.currency, total.value, total.currency
                    ),
                )
                .at("amount")
                .suggest(REAUTHORIZE),
            );
        }
    }

    let claimed = payment.get("cart_reference").and_then(Value::as_str);
    match compute_cart_reference_value(cart) {
        Ok(actual) => {
            if claimed != Some(actual.as_str()) {
                tracing::warn!(
                    reason = "W_CART_REFERENCE",
                    "payment cart_reference does not match the signed cart"
                );
                result.add_error(
                    ValidationError::new(
                        ErrorCode::AuthorizationFailed,
                        "Payment does not reference the signed cart",
                    )
                    .at("cart_reference")
                    .suggest(REAUTHORIZE),
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to compute cart reference");
            result.add_error(
                ValidationError::new(
                    ErrorCode::InternalError,
                    "Unable to compute the cart reference",
                )
                .at("cart_reference")
                .suggest("Retry the request"),
            );
        }
    }

    result
}

pub(crate) fn cart_against_intent_impl(
    cart: &Value,
    intent: &Value,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if let Some(expiry) = intent
        .get(super::intent::EXPIRY)
        .and_then(Value::as_str)
        .and_then(walk::parse_timestamp)
    {
        check_not_expired(expiry, now, &mut result);
    }

    // An empty allow-list leaves the merchant unconstrained.
    if let Some(allowed) = intent
        .get("merchants")
        .and_then(Value::as_array)
        .filter(|list| !list.is_empty())
    {
        let merchant = cart.pointer("/contents/merchant_name").and_then(Value::as_str);
        let permitted = merchant.is_some_and(|m| allowed.iter().any(|a| a.as_str() == Some(m)));
        if !permitted {
            result.add_error(
                ValidationError::new(
                    ErrorCode::MerchantNotAllowed,
                    format!(
                        "Merchant {} is not allowed by the intent mandate",
                        merchant.unwrap_or("<unnamed>")
                    ),
                )
                .at("contents.merchant_name")
                .with_value(&json!(merchant))
                .suggest(format!(
                    "Buy from one of: {}",
                    allowed
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            );
        }
    }

    let requires_refundability = intent
        .get("requires_refundability")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if requires_refundability {
        let items = cart
            .pointer("/contents/line_items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for (i, item) in items.iter().enumerate() {
            let days = item.get("refund_period").and_then(Value::as_u64).unwrap_or(0);
            if days == 0 {
                result.add_error(
                    ValidationError::new(
                        ErrorCode::RefundabilityRequired,
                        "Intent requires refundable items",
                    )
                    .at(format!("contents.line_items[{}].refund_period", i))
                    .with_value(&json!(days))
                    .suggest("Choose items with a refund period"),
                );
            }
        }
    }

    result
}
