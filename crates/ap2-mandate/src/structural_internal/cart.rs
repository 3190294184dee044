use super::walk::{self, ItemView};
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use crate::fields::FieldValidator;
use serde_json::{json, Value};

const CONTENTS: &str = "contents";
const LINE_ITEMS: &str = "contents.line_items";
const TOTAL: &str = "contents.total";

pub(crate) fn validate_cart_impl(fields: &FieldValidator, cart: &Value) -> ValidationResult {
    let mut result = ValidationResult::valid();
    let Some(obj) = walk::object(cart, "", &mut result) else {
        return result;
    };

    walk::required_text(fields, obj, "cart_id", "", &mut result);

    if let Some("") = walk::required_str(obj, "merchant_signature", "", &mut result) {
        result.add_error(walk::missing("merchant_signature"));
    }

    walk::required_timestamp(obj, "timestamp", "", &mut result);

    if let Some(contents) = walk::required(obj, CONTENTS, "", &mut result)
        .and_then(|c| walk::object(c, CONTENTS, &mut result))
    {
        validate_contents(fields, contents, &mut result);
    }

    result
}

fn validate_contents(
    fields: &FieldValidator,
    contents: &serde_json::Map<String, Value>,
    result: &mut ValidationResult,
) {
    let items = match walk::required(contents, "line_items", CONTENTS, result) {
        Some(Value::Array(items)) => {
            let (checked, views) = validate_line_items_impl(fields, items, LINE_ITEMS);
            result.merge(checked);
            Some(views)
        }
        Some(other) => {
            result.add_error(walk::wrong_type(LINE_ITEMS, "an array", other));
            None
        }
        None => None,
    };

    let total = walk::required(contents, "total", CONTENTS, result)
        .and_then(|t| walk::line_item(fields, t, TOTAL, result));

    walk::optional_text(fields, contents, "merchant_name", CONTENTS, result);

    let (Some(items), Some(total)) = (items, total) else {
        return;
    };
    let Some(total_amount) = total.amount else {
        return;
    };

    let mut currencies_agree = true;
    for (i, item) in items.iter().enumerate() {
        let Some(Some(amount)) = item.as_ref().map(|v| v.amount.as_ref()) else {
            continue;
        };
        if amount.currency != total_amount.currency {
            currencies_agree = false;
            result.add_error(
                ValidationError::new(
                    ErrorCode::CurrencyMismatch,
                    format!(
                        "Line item currency {} differs from cart total currency {}",
                        amount.currency, total_amount.currency
                    ),
                )
                .at(format!("{}[{}].amount.currency", LINE_ITEMS, i))
                .with_value(&json!(amount.currency))
                .suggest(format!("Price every item in {}", total_amount.currency)),
            );
        }
    }

    // The sum is only meaningful when every item parsed and shares a currency.
    let parsed: Option<Vec<f64>> = items
        .iter()
        .map(|v| v.as_ref().and_then(|v| v.amount.as_ref()).map(|m| m.value))
        .collect();
    let Some(values) = parsed else {
        return;
    };
    if !currencies_agree {
        return;
    }

    let sum: f64 = values.iter().sum();
    let epsilon = fields.config().total_epsilon;
    if (sum - total_amount.value).abs() > epsilon {
        result.add_error(
            ValidationError::new(
                ErrorCode::CartTotalMismatch,
                format!(
                    "Cart total {:.2} does not equal the sum of line items {:.2}",
                    total_amount.value, sum
                ),
            )
            .at(TOTAL)
            .with_value(&json!(total_amount.value))
            .suggest(format!("Set the total to {:.2} {}", sum, total_amount.currency)),
        );
    }
}

/// Validate each item under `base[i]`. The returned views line up with the
/// input; `None` marks an item too malformed to inspect further.
pub(crate) fn validate_line_items_impl(
    fields: &FieldValidator,
    items: &[Value],
    base: &str,
) -> (ValidationResult, Vec<Option<ItemView>>) {
    let mut result = ValidationResult::valid();
    let max = fields.config().max_line_items;

    if items.len() > max {
        result.add_error(
            ValidationError::new(
                ErrorCode::InvalidFieldFormat,
                format!("Too many line items: {}", items.len()),
            )
            .at(base)
            .suggest(format!("Reduce to {} items or less", max)),
        );
    }

    let views = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = join_path(base, &format!("[{}]", i));
            walk::line_item(fields, item, &path, &mut result)
        })
        .collect();

    (result, views)
}
