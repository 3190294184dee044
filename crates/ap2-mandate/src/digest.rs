//! Content-addressed mandate references.
//!
//! ```text
//! reference = "sha256:" + lowercase_hex(SHA256(JCS(content)))
//! ```
//!
//! A cart reference covers the whole signed cart, so any change to its
//! contents (or its signature) yields a different reference. A payment
//! reference excludes `user_authorization`, which itself carries the
//! reference in its `transaction_data` claim.

use crate::types::{CartMandate, PaymentMandate};
use anyhow::{Context as _, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const REFERENCE_PREFIX: &str = "sha256:";

/// Length of a reference string: prefix plus 64 hex chars.
pub const REFERENCE_LEN: usize = 71;

fn reference_of<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let canonical = serde_jcs::to_vec(value).context("failed to canonicalize mandate")?;
    let hash = Sha256::digest(&canonical);
    Ok(format!("{}{}", REFERENCE_PREFIX, hex::encode(hash)))
}

pub fn compute_cart_reference(cart: &CartMandate) -> Result<String> {
    reference_of(cart)
}

/// Same as [`compute_cart_reference`] for a cart that is still raw JSON.
pub fn compute_cart_reference_value(cart: &Value) -> Result<String> {
    reference_of(cart)
}

pub fn compute_payment_reference(payment: &PaymentMandate) -> Result<String> {
    let value = serde_json::to_value(payment).context("failed to serialize payment mandate")?;
    compute_payment_reference_value(&value)
}

/// Payment reference over raw JSON; `user_authorization` is ignored.
pub fn compute_payment_reference_value(payment: &Value) -> Result<String> {
    match payment {
        Value::Object(map) => {
            let mut hashable = map.clone();
            hashable.remove("user_authorization");
            reference_of(&hashable)
        }
        other => reference_of(other),
    }
}

/// Whether `s` has the shape of a reference (`sha256:` + 64 lowercase hex).
pub fn is_reference(s: &str) -> bool {
    s.len() == REFERENCE_LEN
        && s.strip_prefix(REFERENCE_PREFIX).is_some_and(|hex| {
            hex.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Money, PaymentItem};
    use serde_json::json;

    fn cart() -> CartMandate {
        CartMandate::from_items(
            "cart-1",
            vec![PaymentItem::new("Shoes", Money::new("USD", 20.0))],
        )
        .signed("merchant-sig")
    }

    #[test]
    fn test_reference_format() {
        let r = compute_cart_reference(&cart()).unwrap();
        assert!(r.starts_with("sha256:"));
        assert_eq!(r.len(), REFERENCE_LEN);
        assert!(is_reference(&r));
    }

    #[test]
    fn test_typed_and_raw_agree() {
        let c = cart();
        let raw = serde_json::to_value(&c).unwrap();
        assert_eq!(
            compute_cart_reference(&c).unwrap(),
            compute_cart_reference_value(&raw).unwrap()
        );
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"a": 1, "b": {"y": 2, "x": 1}});
        let b = json!({"b": {"x": 1, "y": 2}, "a": 1});
        assert_eq!(
            compute_cart_reference_value(&a).unwrap(),
            compute_cart_reference_value(&b).unwrap()
        );
    }

    #[test]
    fn test_mutation_changes_reference() {
        let original = cart();
        let mut mutated = original.clone();
        mutated.contents.line_items[0].amount.value = 19.0;
        assert_ne!(
            compute_cart_reference(&original).unwrap(),
            compute_cart_reference(&mutated).unwrap()
        );
    }

    #[test]
    fn test_payment_reference_ignores_authorization() {
        let payment = PaymentMandate::new(
            compute_cart_reference(&cart()).unwrap(),
            Money::new("USD", 20.0),
            json!("CARD"),
        );
        let authorized = payment.clone().authorized_by("a.b.c");
        assert_eq!(
            compute_payment_reference(&payment).unwrap(),
            compute_payment_reference(&authorized).unwrap()
        );
    }

    #[test]
    fn test_is_reference_rejects_bad_shapes() {
        assert!(!is_reference("sha256:abc"));
        assert!(!is_reference(&format!("sha256:{}", "G".repeat(64))));
        assert!(!is_reference(&format!("sha256:{}", "A".repeat(64))));
        assert!(!is_reference(&format!("md5:{}", "a".repeat(66))));
    }
}
