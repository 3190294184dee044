use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use crate::fields::FieldValidator;
use crate::types::Money;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A line item that parsed far enough to take part in cross-field checks.
#[derive(Debug, Clone)]
pub(crate) struct ItemView {
    pub(crate) amount: Option<Money>,
    pub(crate) refund_period: u64,
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn missing(path: &str) -> ValidationError {
    ValidationError::new(
        ErrorCode::MissingRequiredField,
        format!("{} is required", if path.is_empty() { "value" } else { path }),
    )
    .at(path)
    .suggest(format!("Provide {}", if path.is_empty() { "a value" } else { path }))
}

pub(crate) fn wrong_type(path: &str, expected: &str, found: &Value) -> ValidationError {
    ValidationError::new(
        ErrorCode::InvalidFieldFormat,
        format!("Expected {}, found {}", expected, json_type(found)),
    )
    .at(path)
    .with_value(found)
    .suggest(format!(
        "Provide {} as {}",
        if path.is_empty() { "the value" } else { path },
        expected
    ))
}

pub(crate) fn serialization_failure(err: &serde_json::Error) -> ValidationResult {
    ValidationResult::failure(
        ValidationError::new(
            ErrorCode::InternalError,
            format!("Failed to serialize mandate: {}", err),
        )
        .suggest("Retry the request"),
    )
}

/// The value at `path` as an object. Null counts as missing.
pub(crate) fn object<'v>(
    value: &'v Value,
    path: &str,
    result: &mut ValidationResult,
) -> Option<&'v Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Null => {
            result.add_error(missing(path));
            None
        }
        other => {
            result.add_error(wrong_type(path, "an object", other));
            None
        }
    }
}

/// A present, non-null member.
pub(crate) fn required<'v>(
    obj: &'v Map<String, Value>,
    key: &str,
    base: &str,
    result: &mut ValidationResult,
) -> Option<&'v Value> {
    match obj.get(key) {
        None | Some(Value::Null) => {
            result.add_error(missing(&join_path(base, key)));
            None
        }
        Some(v) => Some(v),
    }
}

/// A member that may be absent or null.
pub(crate) fn optional<'v>(obj: &'v Map<String, Value>, key: &str) -> Option<&'v Value> {
    obj.get(key).filter(|v| !v.is_null())
}

pub(crate) fn required_str<'v>(
    obj: &'v Map<String, Value>,
    key: &str,
    base: &str,
    result: &mut ValidationResult,
) -> Option<&'v str> {
    let value = required(obj, key, base, result)?;
    match value.as_str() {
        Some(s) => Some(s),
        None => {
            result.add_error(wrong_type(&join_path(base, key), "a string", value));
            None
        }
    }
}

/// Required string checked with the configured length and character rules.
pub(crate) fn required_text<'v>(
    fields: &FieldValidator,
    obj: &'v Map<String, Value>,
    key: &str,
    base: &str,
    result: &mut ValidationResult,
) -> Option<&'v str> {
    let s = required_str(obj, key, base, result)?;
    let checked = fields.validate_text(s, &join_path(base, key), true);
    let ok = checked.is_valid;
    result.merge(checked);
    ok.then_some(s)
}

/// Optional string checked with the configured rules when present.
pub(crate) fn optional_text<'v>(
    fields: &FieldValidator,
    obj: &'v Map<String, Value>,
    key: &str,
    base: &str,
    result: &mut ValidationResult,
) -> Option<&'v str> {
    let value = optional(obj, key)?;
    let path = join_path(base, key);
    match value.as_str() {
        Some(s) => {
            result.merge(fields.validate_text(s, &path, false));
            Some(s)
        }
        None => {
            result.add_error(wrong_type(&path, "a string", value));
            None
        }
    }
}

pub(crate) fn optional_bool(
    obj: &Map<String, Value>,
    key: &str,
    base: &str,
    default: bool,
    result: &mut ValidationResult,
) -> bool {
    match optional(obj, key) {
        None => default,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            result.add_error(wrong_type(&join_path(base, key), "a boolean", other));
            default
        }
    }
}

/// Optional list of strings; each entry goes through the text rules.
pub(crate) fn optional_string_list(
    fields: &FieldValidator,
    obj: &Map<String, Value>,
    key: &str,
    base: &str,
    result: &mut ValidationResult,
) -> Option<Vec<String>> {
    let value = optional(obj, key)?;
    let path = join_path(base, key);
    let Some(items) = value.as_array() else {
        result.add_error(wrong_type(&path, "an array of strings", value));
        return None;
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = join_path(&path, &format!("[{}]", i));
        match item.as_str() {
            Some(s) => {
                result.merge(fields.validate_text(s, &item_path, true));
                out.push(s.to_string());
            }
            None => result.add_error(wrong_type(&item_path, "a string", item)),
        }
    }
    Some(out)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Required RFC 3339 timestamp.
pub(crate) fn required_timestamp(
    obj: &Map<String, Value>,
    key: &str,
    base: &str,
    result: &mut ValidationResult,
) -> Option<DateTime<Utc>> {
    let s = required_str(obj, key, base, result)?;
    match parse_timestamp(s) {
        Some(ts) => Some(ts),
        None => {
            result.add_error(
                ValidationError::new(
                    ErrorCode::InvalidFieldFormat,
                    format!("Invalid timestamp: {}", s),
                )
                .at(join_path(base, key))
                .with_value(&Value::String(s.to_string()))
                .suggest("Use an RFC 3339 timestamp such as 2025-09-16T12:00:00Z"),
            );
            None
        }
    }
}

/// `{currency, value}` at `path`. Returns the parsed money when both members
/// have the right types, even if they fail the range checks.
pub(crate) fn money(
    fields: &FieldValidator,
    value: &Value,
    path: &str,
    result: &mut ValidationResult,
) -> Option<Money> {
    let obj = object(value, path, result)?;

    let currency = match optional(obj, "currency") {
        None => {
            result.merge(fields.validate_currency("", &join_path(path, "currency")));
            None
        }
        Some(Value::String(c)) => {
            result.merge(fields.validate_currency(c, &join_path(path, "currency")));
            Some(c.clone())
        }
        Some(other) => {
            result.add_error(
                ValidationError::new(ErrorCode::InvalidCurrencyCode, "Currency must be a string")
                    .at(join_path(path, "currency"))
                    .with_value(other)
                    .suggest("Provide a valid ISO 4217 currency code"),
            );
            None
        }
    };

    let value_path = join_path(path, "value");
    let amount = match optional(obj, "value") {
        None => {
            result.add_error(missing(&value_path));
            None
        }
        Some(v) => match v.as_f64() {
            Some(n) => {
                result.merge(fields.validate_amount_value(n, &value_path));
                Some(n)
            }
            None => {
                result.add_error(
                    ValidationError::new(ErrorCode::InvalidAmount, "Amount value must be a number")
                        .at(&value_path)
                        .with_value(v)
                        .suggest("Provide a numeric value"),
                );
                None
            }
        },
    };

    Some(Money::new(currency?, amount?))
}

/// One payment line item at `path`.
pub(crate) fn line_item(
    fields: &FieldValidator,
    value: &Value,
    path: &str,
    result: &mut ValidationResult,
) -> Option<ItemView> {
    let obj = object(value, path, result)?;

    required_text(fields, obj, "label", path, result);

    let amount = required(obj, "amount", path, result)
        .and_then(|a| money(fields, a, &join_path(path, "amount"), result));

    optional_bool(obj, "pending", path, false, result);

    let refund_period = match optional(obj, "refund_period") {
        None => 0,
        Some(v) => match v.as_u64() {
            Some(days) => days,
            None => {
                result.add_error(
                    ValidationError::new(
                        ErrorCode::InvalidFieldFormat,
                        "refund_period must be a whole number of days",
                    )
                    .at(join_path(path, "refund_period"))
                    .with_value(v)
                    .suggest("Provide 0 or a positive number of days"),
                );
                0
            }
        },
    };

    Some(ItemView {
        amount,
        refund_period,
    })
}
