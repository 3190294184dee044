use super::walk;
use crate::digest::is_reference;
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use crate::fields::FieldValidator;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

pub(crate) fn validate_payment_impl(
    fields: &FieldValidator,
    payment: &Value,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut result = ValidationResult::valid();
    let Some(obj) = walk::object(payment, "", &mut result) else {
        return result;
    };

    walk::optional_text(fields, obj, "payment_mandate_id", "", &mut result);

    if let Some(reference) = walk::required_str(obj, "cart_reference", "", &mut result) {
        if !is_reference(reference) {
            result.add_error(
                ValidationError::new(
                    ErrorCode::InvalidFieldFormat,
                    "cart_reference is not a sha256 content reference",
                )
                .at("cart_reference")
                .with_value(&json!(reference))
                .suggest("Use the sha256:<hex> reference of the signed cart"),
            );
        }
    }

    if let Some(amount) = walk::required(obj, "amount", "", &mut result) {
        walk::money(fields, amount, "amount", &mut result);
    }

    if let Some(method) = walk::required(obj, "payment_method", "", &mut result) {
        validate_payment_method(fields, method, &mut result);
    }

    if let Some(created) = walk::required_timestamp(obj, "creation_time", "", &mut result) {
        let skew = Duration::seconds(fields.config().clock_skew_seconds as i64);
        if created > now + skew {
            result.add_warning(format!(
                "Payment mandate creation_time {} is in the future",
                created.to_rfc3339()
            ));
        }
    }

    // user_authorization is judged by the token validator.
    result
}

/// A method name, or an object carrying a non-empty `method_name`.
fn validate_payment_method(fields: &FieldValidator, method: &Value, result: &mut ValidationResult) {
    const PATH: &str = "payment_method";
    match method {
        Value::String(name) => {
            let checked = fields.validate_text(name, PATH, true);
            result.merge(checked);
        }
        Value::Object(obj) => match obj.get("method_name") {
            Some(Value::String(name)) if !name.is_empty() => {
                result.merge(fields.validate_text(name, &join_path(PATH, "method_name"), true));
            }
            Some(Value::String(_)) | None | Some(Value::Null) => {
                result.add_error(walk::missing(&join_path(PATH, "method_name")));
            }
            Some(other) => {
                result.add_error(invalid_method(&join_path(PATH, "method_name"), other));
            }
        },
        other => result.add_error(invalid_method(PATH, other)),
    }
}

fn invalid_method(path: &str, value: &Value) -> ValidationError {
    ValidationError::new(
        ErrorCode::InvalidPaymentMethod,
        "Payment method must be a method name or a method descriptor object",
    )
    .at(path)
    .with_value(value)
    .suggest("Provide the payment method name, e.g. \"CARD\"")
}
