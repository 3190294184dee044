use super::super::*;
use crate::digest::compute_cart_reference_value;
use crate::errors::ErrorCode;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};

fn validator() -> MandateValidator {
    MandateValidator::new(ValidationConfig::default()).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 16, 12, 0, 0).unwrap()
}

fn item(label: &str, value: f64) -> Value {
    json!({
        "label": label,
        "amount": {"currency": "USD", "value": value},
        "pending": false,
        "refund_period": 30,
    })
}

fn cart_with(items: Vec<Value>, total: f64) -> Value {
    json!({
        "cart_id": "cart-123",
        "contents": {
            "line_items": items,
            "total": item("Total", total),
            "merchant_name": "Acme Shoes",
        },
        "merchant_signature": "eyJhbGciOiJFUzI1NksifQ.e30.c2ln",
        "timestamp": "2025-09-16T11:59:00Z",
    })
}

fn intent(expiry: DateTime<Utc>) -> Value {
    json!({
        "natural_language_description": "Red running shoes under 100 USD",
        "user_cart_confirmation_required": true,
        "merchants": ["Acme Shoes"],
        "requires_refundability": false,
        "intent_expiry": expiry.to_rfc3339(),
    })
}

fn payment_for(cart: &Value, value: f64) -> Value {
    json!({
        "payment_mandate_id": "pm-1",
        "cart_reference": compute_cart_reference_value(cart).unwrap(),
        "amount": {"currency": "USD", "value": value},
        "payment_method": "CARD",
        "user_authorization": "a.b.c",
        "creation_time": "2025-09-16T11:59:30Z",
    })
}

#[test]
fn test_cart_sum_invariant() {
    let v = validator();
    let items = vec![item("Shoes", 20.0), item("Socks", 5.0)];

    let ok = v.validate_cart(&cart_with(items.clone(), 25.0));
    assert!(ok.is_valid, "{:?}", ok.errors);

    let bad = v.validate_cart(&cart_with(items, 24.0));
    assert_eq!(bad.codes(), vec![ErrorCode::CartTotalMismatch]);
    assert_eq!(bad.errors[0].field_path, "contents.total");
    assert!(!bad.errors[0].suggestions.is_empty());
}

#[test]
fn test_cart_sum_tolerates_epsilon() {
    let v = validator();
    let items = vec![item("A", 0.1), item("B", 0.2)];
    assert!(v.validate_cart(&cart_with(items, 0.3)).is_valid);

    let items = vec![item("A", 10.0)];
    assert!(!v.validate_cart(&cart_with(items, 10.01)).is_valid);
}

#[test]
fn test_empty_cart_totals_zero() {
    let v = validator();
    assert!(v.validate_cart(&cart_with(vec![], 0.0)).is_valid);
    assert!(v.validate_cart(&cart_with(vec![], 1.0)).has_code(ErrorCode::CartTotalMismatch));
}

#[test]
fn test_cart_currency_mismatch() {
    let v = validator();
    let mut eur = item("Socks", 5.0);
    eur["amount"]["currency"] = json!("EUR");
    let r = v.validate_cart(&cart_with(vec![item("Shoes", 20.0), eur], 25.0));
    assert_eq!(r.codes(), vec![ErrorCode::CurrencyMismatch]);
    assert_eq!(r.errors[0].field_path, "contents.line_items[1].amount.currency");
}

#[test]
fn test_cart_accumulates_errors_in_order() {
    let v = validator();
    let mut cart = cart_with(vec![item("", 20.0), item("Socks", -5.0)], 15.0);
    cart["cart_id"] = json!("");

    let r = v.validate_cart(&cart);
    let paths: Vec<&str> = r.errors.iter().map(|e| e.field_path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "cart_id",
            "contents.line_items[0].label",
            "contents.line_items[1].amount.value",
        ]
    );
    assert_eq!(
        r.codes(),
        vec![
            ErrorCode::MissingRequiredField,
            ErrorCode::MissingRequiredField,
            ErrorCode::InvalidAmount,
        ]
    );
}

#[test]
fn test_cart_missing_signature() {
    let v = validator();
    let mut cart = cart_with(vec![item("Shoes", 20.0)], 20.0);
    cart["merchant_signature"] = json!("");
    let r = v.validate_cart(&cart);
    assert_eq!(r.codes(), vec![ErrorCode::MissingRequiredField]);
    assert_eq!(r.errors[0].field_path, "merchant_signature");

    cart.as_object_mut().unwrap().remove("merchant_signature");
    assert!(v.validate_cart(&cart).has_code(ErrorCode::MissingRequiredField));
}

#[test]
fn test_cart_too_many_items() {
    let cfg = ValidationConfig {
        max_line_items: 2,
        ..Default::default()
    };
    let v = MandateValidator::new(cfg).unwrap();
    let items = vec![item("A", 1.0), item("B", 1.0), item("C", 1.0)];
    let r = v.validate_cart(&cart_with(items, 3.0));
    assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat]);
    assert_eq!(r.errors[0].field_path, "contents.line_items");
}

#[test]
fn test_totality_on_garbage() {
    let v = validator();
    for input in [
        json!({}),
        json!(null),
        json!(42),
        json!("cart"),
        json!([1, 2, 3]),
        json!({"contents": []}),
        json!({"contents": {"line_items": "nope", "total": 7}}),
        json!({"contents": {"line_items": [null, {"amount": "x"}], "total": {}}}),
    ] {
        let r = v.validate_cart(&input);
        assert!(!r.is_valid, "{}", input);
        assert!(!v.validate_intent_at(&input, now()).is_valid);
        assert!(!v.validate_payment_at(&input, now()).is_valid);
    }
}

#[test]
fn test_empty_object_reports_every_required_field() {
    let r = validator().validate_cart(&json!({}));
    let paths: Vec<&str> = r.errors.iter().map(|e| e.field_path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["cart_id", "merchant_signature", "timestamp", "contents"]
    );
    assert!(r
        .errors
        .iter()
        .all(|e| e.code == ErrorCode::MissingRequiredField));
}

#[test]
fn test_line_item_batch_paths() {
    let v = validator();
    let r = v.validate_line_items(&[
        item("ok", 1.0),
        json!({"label": "x", "amount": {"currency": "usd", "value": 1}}),
        json!("not an item"),
    ]);
    let paths: Vec<&str> = r.errors.iter().map(|e| e.field_path.as_str()).collect();
    assert_eq!(paths, vec!["items[1].amount.currency", "items[2]"]);
}

#[test]
fn test_intent_valid_and_expired() {
    let v = validator();
    assert!(v
        .validate_intent_at(&intent(now() + Duration::hours(1)), now())
        .is_valid);

    let at_boundary = v.validate_intent_at(&intent(now()), now());
    assert_eq!(at_boundary.codes(), vec![ErrorCode::IntentExpired]);
    assert_eq!(at_boundary.errors[0].field_path, "intent_expiry");

    let mut broken = intent(now() - Duration::days(1));
    broken["natural_language_description"] = json!("");
    let r = v.validate_intent_at(&broken, now());
    assert!(r.has_code(ErrorCode::IntentExpired));
    assert!(r.has_code(ErrorCode::MissingRequiredField));
}

#[test]
fn test_intent_bad_expiry_format() {
    let mut i = intent(now());
    i["intent_expiry"] = json!("tomorrow");
    let r = validator().validate_intent_at(&i, now());
    assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat]);
}

fn session(expiry: DateTime<Utc>) -> Value {
    json!({
        "session_id": "sess-1",
        "agent_did": "did:web:shopper.example",
        "session_expiry": expiry.to_rfc3339(),
        "status": "active",
        "intents": ["purchase"],
    })
}

fn autonomous_intent(expiry: DateTime<Utc>) -> Value {
    let mut i = intent(expiry);
    i["user_cart_confirmation_required"] = json!(false);
    i["agent_did"] = json!("did:web:shopper.example");
    i["session_authorization"] = session(expiry);
    i
}

#[test]
fn test_autonomous_intent_without_constraints_warns() {
    let mut i = autonomous_intent(now() + Duration::hours(1));
    i.as_object_mut().unwrap().remove("merchants");

    let r = validator().validate_intent_at(&i, now());
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.warnings.len(), 1);

    i["skus"] = json!(["SKU-1"]);
    assert!(validator().validate_intent_at(&i, now()).warnings.is_empty());

    // An empty allow-list constrains nothing.
    i["skus"] = json!([]);
    i["merchants"] = json!([]);
    assert_eq!(validator().validate_intent_at(&i, now()).warnings.len(), 1);
}

#[test]
fn test_autonomous_intent_requires_agent_and_session() {
    let mut i = intent(now() + Duration::hours(1));
    i["user_cart_confirmation_required"] = json!(false);
    let r = validator().validate_intent_at(&i, now());
    assert_eq!(
        r.codes(),
        vec![ErrorCode::MissingRequiredField, ErrorCode::MissingRequiredField]
    );
    assert_eq!(r.errors[0].field_path, "agent_did");
    assert_eq!(r.errors[1].field_path, "session_authorization");

    assert!(validator()
        .validate_intent_at(&autonomous_intent(now() + Duration::hours(1)), now())
        .is_valid);
}

#[test]
fn test_session_authorization_checks() {
    let v = validator();
    let expiry = now() + Duration::hours(1);

    let mut revoked = autonomous_intent(expiry);
    revoked["session_authorization"]["status"] = json!("revoked");
    let r = v.validate_intent_at(&revoked, now());
    assert_eq!(r.codes(), vec![ErrorCode::AuthorizationFailed]);
    assert_eq!(r.errors[0].field_path, "session_authorization.status");
    assert_eq!(r.errors[0].message, "Session authorization status is revoked");

    let mut lapsed = autonomous_intent(expiry);
    lapsed["session_authorization"]["session_expiry"] =
        json!((now() - Duration::minutes(1)).to_rfc3339());
    let r = v.validate_intent_at(&lapsed, now());
    assert_eq!(r.codes(), vec![ErrorCode::AuthorizationFailed]);
    assert_eq!(r.errors[0].field_path, "session_authorization.session_expiry");

    let mut other_agent = autonomous_intent(expiry);
    other_agent["session_authorization"]["agent_did"] = json!("did:web:other.example");
    let r = v.validate_intent_at(&other_agent, now());
    assert_eq!(r.codes(), vec![ErrorCode::AuthorizationFailed]);
    assert_eq!(r.errors[0].field_path, "session_authorization.agent_did");

    let mut outlives = autonomous_intent(expiry);
    outlives["session_authorization"]["session_expiry"] =
        json!((expiry + Duration::hours(1)).to_rfc3339());
    outlives["session_authorization"]["intents"] = json!([]);
    let r = v.validate_intent_at(&outlives, now());
    assert!(r.is_valid);
    assert_eq!(
        r.warnings,
        vec![
            "Session authorization expires after intent mandate".to_string(),
            "Session authorization has no specific intents defined".to_string(),
        ]
    );

    // Ignored, with a warning, when the user confirms the cart.
    let mut present = intent(expiry);
    present["session_authorization"] = json!({"status": "revoked"});
    let r = v.validate_intent_at(&present, now());
    assert!(r.is_valid);
    assert_eq!(r.warnings.len(), 1);
}

#[test]
fn test_agent_did_and_delegation_depth() {
    let v = validator();
    let live = now() + Duration::hours(1);

    for did in ["web:shopper.example", "did::x", "did:web:", "did:web"] {
        let mut i = intent(live);
        i["agent_did"] = json!(did);
        let r = v.validate_intent_at(&i, now());
        assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat], "{}", did);
        assert_eq!(r.errors[0].field_path, "agent_did");
    }

    let mut exotic = intent(live);
    exotic["agent_did"] = json!("did:plc:abc123");
    let r = v.validate_intent_at(&exotic, now());
    assert!(r.is_valid);
    assert_eq!(r.warnings.len(), 1);
    assert!(r.warnings[0].contains("'plc'"));

    for (depth, ok) in [(json!(1), true), (json!(5), true), (json!(0), false), (json!(6), false)] {
        let mut i = intent(live);
        i["delegation_depth"] = depth.clone();
        let r = v.validate_intent_at(&i, now());
        assert_eq!(r.is_valid, ok, "depth {}", depth);
        if !ok {
            assert_eq!(r.errors[0].field_path, "delegation_depth");
        }
    }
    let mut fractional = intent(live);
    fractional["delegation_depth"] = json!(2.5);
    assert_eq!(
        v.validate_intent_at(&fractional, now()).codes(),
        vec![ErrorCode::InvalidFieldFormat]
    );
}

#[test]
fn test_payment_valid() {
    let cart = cart_with(vec![item("Shoes", 20.0)], 20.0);
    let r = validator().validate_payment_at(&payment_for(&cart, 20.0), now());
    assert!(r.is_valid, "{:?}", r.errors);
}

#[test]
fn test_payment_method_shapes() {
    let v = validator();
    let cart = cart_with(vec![item("Shoes", 20.0)], 20.0);

    let mut p = payment_for(&cart, 20.0);
    p["payment_method"] = json!({"method_name": "CARD", "details": {"token": "t"}});
    assert!(v.validate_payment_at(&p, now()).is_valid);

    p["payment_method"] = json!({"details": {}});
    assert_eq!(
        v.validate_payment_at(&p, now()).codes(),
        vec![ErrorCode::MissingRequiredField]
    );

    p["payment_method"] = json!(17);
    assert_eq!(
        v.validate_payment_at(&p, now()).codes(),
        vec![ErrorCode::InvalidPaymentMethod]
    );
}

#[test]
fn test_payment_bad_reference_and_future_creation() {
    let cart = cart_with(vec![item("Shoes", 20.0)], 20.0);
    let mut p = payment_for(&cart, 20.0);
    p["cart_reference"] = json!("cart-123");
    p["creation_time"] = json!("2025-09-16T13:00:00Z");

    let r = validator().validate_payment_at(&p, now());
    assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat]);
    assert_eq!(r.errors[0].field_path, "cart_reference");
    assert_eq!(r.warnings.len(), 1);
}

#[test]
fn test_payment_against_cart() {
    let v = validator();
    let cart = cart_with(vec![item("Shoes", 20.0), item("Socks", 5.0)], 25.0);

    assert!(v
        .validate_payment_against_cart(&payment_for(&cart, 25.0), &cart)
        .is_valid);

    let short = v.validate_payment_against_cart(&payment_for(&cart, 24.0), &cart);
    assert_eq!(short.codes(), vec![ErrorCode::AuthorizationFailed]);
    assert_eq!(short.errors[0].field_path, "amount");

    let mut other_cart = cart.clone();
    other_cart["contents"]["merchant_name"] = json!("Evil Shoes");
    let stale = v.validate_payment_against_cart(&payment_for(&cart, 25.0), &other_cart);
    assert_eq!(stale.codes(), vec![ErrorCode::AuthorizationFailed]);
    assert_eq!(stale.errors[0].field_path, "cart_reference");
}

#[test]
fn test_cart_against_intent() {
    let v = validator();
    let cart = cart_with(vec![item("Shoes", 20.0)], 20.0);
    let live = intent(now() + Duration::hours(1));
    assert!(v.validate_cart_against_intent(&cart, &live, now()).is_valid);

    let mut wrong_merchant = cart.clone();
    wrong_merchant["contents"]["merchant_name"] = json!("Other");
    let r = v.validate_cart_against_intent(&wrong_merchant, &live, now());
    assert_eq!(r.codes(), vec![ErrorCode::MerchantNotAllowed]);
    assert_eq!(r.errors[0].field_path, "contents.merchant_name");

    let mut strict = live.clone();
    strict["requires_refundability"] = json!(true);
    let mut final_sale = cart.clone();
    final_sale["contents"]["line_items"][0]["refund_period"] = json!(0);
    let r = v.validate_cart_against_intent(&final_sale, &strict, now());
    assert_eq!(r.codes(), vec![ErrorCode::RefundabilityRequired]);
    assert_eq!(r.errors[0].field_path, "contents.line_items[0].refund_period");

    let expired = intent(now() - Duration::seconds(1));
    assert_eq!(
        v.validate_cart_against_intent(&cart, &expired, now()).codes(),
        vec![ErrorCode::IntentExpired]
    );
}

#[test]
fn test_empty_merchant_list_allows_any_merchant() {
    let v = validator();
    let mut open = intent(now() + Duration::hours(1));
    open["merchants"] = json!([]);
    let mut cart = cart_with(vec![item("Shoes", 20.0)], 20.0);
    cart["contents"]["merchant_name"] = json!("Anyone");

    assert!(v.validate_cart_against_intent(&cart, &open, now()).is_valid);
    cart["contents"].as_object_mut().unwrap().remove("merchant_name");
    assert!(v.validate_cart_against_intent(&cart, &open, now()).is_valid);
}

fn payment_request() -> Value {
    json!({
        "method_data": [{"supported_methods": "CARD", "data": {"networks": ["visa"]}}],
        "details": {
            "id": "order-42",
            "display_items": [item("Shoes", 20.0), item("Socks", 5.0)],
            "total": item("Total", 25.0),
        },
    })
}

#[test]
fn test_payment_request_valid() {
    let r = validator().validate_payment_request(&payment_request());
    assert!(r.is_valid, "{:?}", r.errors);
}

#[test]
fn test_payment_request_errors() {
    let v = validator();

    let r = v.validate_payment_request(&json!("pay me"));
    assert_eq!(r.codes(), vec![ErrorCode::InvalidPaymentRequest]);

    let mut no_methods = payment_request();
    no_methods["method_data"] = json!([]);
    let r = v.validate_payment_request(&no_methods);
    assert_eq!(r.codes(), vec![ErrorCode::InvalidPaymentRequest]);
    assert_eq!(r.errors[0].field_path, "method_data");

    let mut bad = payment_request();
    bad["method_data"][0]["supported_methods"] = json!("<script>");
    bad["details"]["id"] = json!("");
    bad["details"]["total"]["amount"]["value"] = json!(-1.0);
    bad["details"]["display_items"][1]["amount"]["currency"] = json!("usd");
    let r = v.validate_payment_request(&bad);
    assert_eq!(
        r.codes(),
        vec![
            ErrorCode::InvalidFieldFormat,
            ErrorCode::MissingRequiredField,
            ErrorCode::InvalidAmount,
            ErrorCode::InvalidCurrencyCode,
        ]
    );
    let paths: Vec<&str> = r.errors.iter().map(|e| e.field_path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "method_data[0].supported_methods",
            "details.id",
            "details.total.amount.value",
            "details.display_items[1].amount.currency",
        ]
    );
}

#[test]
fn test_payment_request_display_item_limit() {
    let config = ValidationConfig {
        max_line_items: 2,
        ..ValidationConfig::default()
    };
    let v = MandateValidator::new(config).unwrap();
    let mut crowded = payment_request();
    crowded["details"]["display_items"] =
        json!([item("A", 1.0), item("B", 1.0), item("C", 1.0)]);
    let r = v.validate_payment_request(&crowded);
    assert_eq!(r.codes(), vec![ErrorCode::InvalidFieldFormat]);
    assert_eq!(r.errors[0].field_path, "details.display_items");
}

#[test]
fn test_typed_payment_request() {
    use crate::types::{Money, PaymentItem, PaymentRequest};
    let v = validator();
    let request = PaymentRequest::new(
        "order-7",
        vec![PaymentItem::new("Shoes", Money::new("USD", 20.0))],
        Money::new("USD", 20.0),
    );
    assert!(!v.validate_payment_request_typed(&request).is_valid);
    assert!(v
        .validate_payment_request_typed(&request.accepting("CARD"))
        .is_valid);
}

#[test]
fn test_typed_wrappers_match_raw() {
    use crate::types::{CartMandate, Money, PaymentItem};
    let cart = CartMandate::from_items(
        "cart-1",
        vec![
            PaymentItem::new("Shoes", Money::new("USD", 20.0)),
            PaymentItem::new("Socks", Money::new("USD", 5.0)),
        ],
    )
    .signed("sig");
    let v = validator();
    let typed = v.validate_cart_mandate(&cart);
    assert!(typed.is_valid, "{:?}", typed.errors);
    assert_eq!(typed, v.validate_cart(&serde_json::to_value(&cart).unwrap()));
}

#[test]
fn test_dispatch_by_kind() {
    let v = validator();
    let cart = cart_with(vec![item("Shoes", 20.0)], 20.0);
    let obj = MandateObject::Cart(cart.clone());
    assert_eq!(v.validate_mandate_at(&obj, now()), v.validate_cart(&cart));
}

#[test]
fn test_idempotent() {
    let v = validator();
    let cart = cart_with(vec![item("", -1.0)], 3.0);
    assert_eq!(v.validate_cart(&cart), v.validate_cart(&cart));
}
