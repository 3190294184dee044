//! End-to-end checks across the public surface: build typed mandates, validate
//! them, authorize the payment and aggregate the outcome.

use ap2_mandate::*;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

struct AcceptAll;

#[async_trait]
impl SignatureVerifier for AcceptAll {
    async fn verify(&self, request: &VerificationRequest) -> Result<bool, VerifierError> {
        Ok(!request.signature.is_empty())
    }
}

fn cart() -> CartMandate {
    CartMandate::from_items(
        "cart-shoes-1",
        vec![
            PaymentItem::new("Running shoes", Money::new("USD", 20.0)),
            PaymentItem::new("Socks", Money::new("USD", 5.0)),
        ],
    )
    .with_merchant("Acme Shoes")
    .signed("eyJhbGciOiJFUzI1NksifQ.e30.bWVyY2hhbnQ")
}

fn token_for(transaction_data: &[String], alg: &str) -> String {
    let header = json!({"alg": alg, "typ": "JWT"});
    let payload = json!({
        "aud": "merchant_agent",
        "nonce": "3f1c9a",
        "iat": Utc::now().timestamp(),
        "exp": (Utc::now() + Duration::minutes(15)).timestamp(),
        "transaction_data": transaction_data,
    });
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        URL_SAFE_NO_PAD.encode(b"user-signature"),
    )
}

fn signed_payment(cart: &CartMandate, alg: &str) -> PaymentMandate {
    let cart_ref = compute_cart_reference(cart).unwrap();
    let payment = PaymentMandate::new(cart_ref.clone(), cart.total().clone(), json!("CARD"))
        .with_id("pm-001");
    let payment_ref = compute_payment_reference(&payment).unwrap();
    let token = token_for(&[cart_ref, payment_ref], alg);
    payment.authorized_by(token)
}

#[tokio::test]
async fn test_happy_path_end_to_end() {
    let config = ValidationConfig::default();
    let mandates = MandateValidator::new(config.clone()).unwrap();
    let auth = AuthorizationValidator::new(config).unwrap();

    let intent = IntentMandate::new("Running shoes", Utc::now() + Duration::hours(1))
        .with_merchants(["Acme Shoes"])
        .requiring_refundability();
    let cart = cart();
    let payment = signed_payment(&cart, "ES256K");

    let intent_v = serde_json::to_value(&intent).unwrap();
    let cart_v = serde_json::to_value(&cart).unwrap();
    let payment_v = serde_json::to_value(&payment).unwrap();

    let credential = payment_v["user_authorization"].clone();
    let inspection = auth.authorize(&credential, &AcceptAll).await;
    let parsed = inspection.parsed.clone().expect("token verified");

    let outcome = Aggregator::new(AggregationMode::CollectAll).merge([
        mandates.validate_intent(&intent_v),
        mandates.validate_cart(&cart_v),
        mandates.validate_payment(&payment_v),
        mandates.validate_cart_against_intent(&cart_v, &intent_v, Utc::now()),
        mandates.validate_payment_against_cart(&payment_v, &cart_v),
        inspection.result,
        auth.bind_transaction(&parsed, &payment_v),
    ]);

    assert!(outcome.is_valid, "{:#?}", outcome.errors);
    assert!(outcome.into_legacy().is_ok());
}

#[tokio::test]
async fn test_tampered_cart_breaks_binding() {
    let mandates = MandateValidator::new(ValidationConfig::default()).unwrap();
    let auth = AuthorizationValidator::new(ValidationConfig::default()).unwrap();

    let cart = cart();
    let payment = signed_payment(&cart, "ES256K");

    let mut tampered = cart.clone();
    tampered.contents.line_items[1].amount.value = 0.0;
    tampered.contents.total.amount.value = 20.0;

    let tampered_v = serde_json::to_value(&tampered).unwrap();
    let payment_v = serde_json::to_value(&payment).unwrap();

    // The tampered cart is internally consistent ...
    assert!(mandates.validate_cart(&tampered_v).is_valid);

    // ... but the payment and its token no longer match it.
    let cross = mandates.validate_payment_against_cart(&payment_v, &tampered_v);
    assert_eq!(
        cross.codes(),
        vec![ErrorCode::AuthorizationFailed, ErrorCode::AuthorizationFailed]
    );
    assert!(cross.has_band(ErrorBand::Security));

    let parsed = auth
        .authorize(&payment_v["user_authorization"], &AcceptAll)
        .await
        .parsed
        .unwrap();
    let mut rebound = payment_v.clone();
    rebound["cart_reference"] = json!(compute_cart_reference(&tampered).unwrap());
    assert!(!auth.bind_transaction(&parsed, &rebound).is_valid);
}

#[tokio::test]
async fn test_insecure_algorithm_fails_whole_flow() {
    let auth = AuthorizationValidator::new(ValidationConfig::default()).unwrap();
    let payment = signed_payment(&cart(), "HS256");
    let payment_v = serde_json::to_value(&payment).unwrap();

    let inspection = auth.authorize(&payment_v["user_authorization"], &AcceptAll).await;
    assert_eq!(inspection.result.codes(), vec![ErrorCode::SignatureInvalid]);

    let legacy = validate_payment_mandate_signature(&auth, &payment_v).unwrap_err();
    assert_eq!(legacy.code, ErrorCode::SignatureInvalid);
}

#[test]
fn test_wire_format_of_failed_result() {
    let mandates = MandateValidator::new(ValidationConfig::default()).unwrap();
    let cart = cart().with_total(Money::new("USD", 24.0));
    let r = mandates.validate_cart_mandate(&cart);

    let wire: Value = serde_json::to_value(&r).unwrap();
    assert_eq!(wire["is_valid"], json!(false));
    assert_eq!(wire["errors"][0]["error_code"], json!("AP2_2008"));
    assert_eq!(wire["errors"][0]["field_path"], json!("contents.total"));
    assert_eq!(wire["errors"][0]["invalid_value"], json!(24.0));
    assert!(wire["warnings"].as_array().unwrap().is_empty());

    let back: ValidationResult = serde_json::from_value(wire).unwrap();
    assert_eq!(back, r);
}

#[test]
fn test_data_part_extraction_and_dispatch() {
    let mandates = MandateValidator::new(ValidationConfig::default()).unwrap();
    let cart = cart();
    let payment = signed_payment(&cart, "ES256K");

    let part = json!({
        "ap2.mandates.CartMandate": serde_json::to_value(&cart).unwrap(),
        "ap2.mandates.PaymentMandate": serde_json::to_value(&payment).unwrap(),
    });
    let objects = MandateObject::from_data_part(&part);
    assert_eq!(objects.len(), 2);
    for obj in &objects {
        let r = mandates.validate_mandate(obj);
        assert!(r.is_valid, "{}: {:?}", obj.kind(), r.errors);
    }
}

#[test]
fn test_config_from_file_drives_validation() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_amount: 10.0").unwrap();
    let config = ValidationConfig::from_yaml_file(file.path()).unwrap();
    let mandates = MandateValidator::new(config).unwrap();

    let r = mandates.validate_cart_mandate(&cart());
    assert!(r.has_code(ErrorCode::AmountExceedsLimit));
    assert!(r
        .errors
        .iter()
        .all(|e| !e.suggestions.is_empty() && !e.field_path.is_empty()));
}
