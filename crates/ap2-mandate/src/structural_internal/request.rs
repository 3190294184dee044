use super::walk;
use crate::errors::{join_path, ErrorCode, ValidationError, ValidationResult};
use crate::fields::FieldValidator;
use serde_json::Value;

const METHOD_DATA: &str = "method_data";
const DETAILS: &str = "details";
const DISPLAY_ITEMS: &str = "details.display_items";

pub(crate) fn validate_payment_request_impl(
    fields: &FieldValidator,
    request: &Value,
) -> ValidationResult {
    let mut result = ValidationResult::valid();
    let Value::Object(obj) = request else {
        result.add_error(
            ValidationError::new(
                ErrorCode::InvalidPaymentRequest,
                "Payment request must be an object with method_data and details",
            )
            .with_value(request)
            .suggest("Send a PaymentRequest with method_data and details"),
        );
        return result;
    };

    match walk::required(obj, METHOD_DATA, "", &mut result) {
        Some(Value::Array(methods)) if methods.is_empty() => result.add_error(
            ValidationError::new(
                ErrorCode::InvalidPaymentRequest,
                "At least one payment method must be specified",
            )
            .at(METHOD_DATA)
            .suggest("Add at least one supported payment method"),
        ),
        Some(Value::Array(methods)) => {
            for (i, method) in methods.iter().enumerate() {
                let path = format!("{}[{}]", METHOD_DATA, i);
                if let Some(m) = walk::object(method, &path, &mut result) {
                    walk::required_text(fields, m, "supported_methods", &path, &mut result);
                }
            }
        }
        Some(other) => result.add_error(walk::wrong_type(METHOD_DATA, "an array", other)),
        None => {}
    }

    let Some(details) = walk::required(obj, DETAILS, "", &mut result)
        .and_then(|d| walk::object(d, DETAILS, &mut result))
    else {
        return result;
    };

    walk::required_text(fields, details, "id", DETAILS, &mut result);
    if let Some(total) = walk::required(details, "total", DETAILS, &mut result) {
        walk::line_item(fields, total, &join_path(DETAILS, "total"), &mut result);
    }

    match walk::optional(details, "display_items") {
        None => {}
        Some(Value::Array(items)) => {
            let max = fields.config().max_line_items;
            if items.len() > max {
                result.add_error(
                    ValidationError::new(
                        ErrorCode::InvalidFieldFormat,
                        format!("Too many display items: {}", items.len()),
                    )
                    .at(DISPLAY_ITEMS)
                    .suggest(format!("Reduce to {} items or less", max)),
                );
            }
            for (i, item) in items.iter().enumerate() {
                let path = format!("{}[{}]", DISPLAY_ITEMS, i);
                walk::line_item(fields, item, &path, &mut result);
            }
        }
        Some(other) => result.add_error(walk::wrong_type(DISPLAY_ITEMS, "an array", other)),
    }

    result
}
