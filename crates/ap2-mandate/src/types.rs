//! Typed mandate model and data-part envelope keys.
//!
//! The validators operate on decoded JSON so malformed input can be reported
//! field by field; these types are the well-formed shape producers build and
//! consumers read back once a mandate has passed validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INTENT_MANDATE_DATA_KEY: &str = "ap2.mandates.IntentMandate";
pub const CART_MANDATE_DATA_KEY: &str = "ap2.mandates.CartMandate";
pub const PAYMENT_MANDATE_DATA_KEY: &str = "ap2.mandates.PaymentMandate";

/// ISO 4217 currency plus a non-negative value in major units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub currency: String,
    pub value: f64,
}

impl Money {
    pub fn new(currency: impl Into<String>, value: f64) -> Self {
        Self {
            currency: currency.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentItem {
    pub label: String,
    pub amount: Money,
    #[serde(default)]
    pub pending: bool,
    /// Days; zero means the item is not refundable.
    #[serde(default)]
    pub refund_period: u32,
}

impl PaymentItem {
    pub fn new(label: impl Into<String>, amount: Money) -> Self {
        Self {
            label: label.into(),
            amount,
            pending: false,
            refund_period: 30,
        }
    }

    pub fn with_refund_period(mut self, days: u32) -> Self {
        self.refund_period = days;
        self
    }

    pub fn pending(mut self) -> Self {
        self.pending = true;
        self
    }
}

/// What the user asked the agent to buy, and under which constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMandate {
    #[serde(rename = "natural_language_description")]
    pub description: String,
    #[serde(default = "default_true")]
    pub user_cart_confirmation_required: bool,
    #[serde(rename = "merchants", default, skip_serializing_if = "Option::is_none")]
    pub allowed_merchants: Option<Vec<String>>,
    #[serde(rename = "skus", default, skip_serializing_if = "Option::is_none")]
    pub allowed_skus: Option<Vec<String>>,
    #[serde(default)]
    pub requires_refundability: bool,
    #[serde(rename = "intent_expiry")]
    pub expiry: DateTime<Utc>,
    /// `did:<method>:<identifier>` of the agent acting for the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_did: Option<String>,
    /// Number of agent hops between the user and the buyer, 1 to 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_depth: Option<u8>,
    /// Required when the user is not present to confirm the cart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_authorization: Option<SessionAuthorization>,
}

fn default_true() -> bool {
    true
}

impl IntentMandate {
    pub fn new(description: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            description: description.into(),
            user_cart_confirmation_required: true,
            allowed_merchants: None,
            allowed_skus: None,
            requires_refundability: false,
            expiry,
            agent_did: None,
            delegation_depth: None,
            session_authorization: None,
        }
    }

    pub fn with_merchants<I, S>(mut self, merchants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_merchants = Some(merchants.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_skus<I, S>(mut self, skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_skus = Some(skus.into_iter().map(Into::into).collect());
        self
    }

    pub fn requiring_refundability(mut self) -> Self {
        self.requires_refundability = true;
        self
    }

    /// Human not present: the agent may buy without a cart confirmation,
    /// under the given session.
    pub fn autonomous(mut self, session: SessionAuthorization) -> Self {
        self.user_cart_confirmation_required = false;
        self.agent_did = Some(session.agent_did.clone());
        self.session_authorization = Some(session);
        self
    }

    pub fn with_agent(mut self, did: impl Into<String>) -> Self {
        self.agent_did = Some(did.into());
        self
    }

    pub fn with_delegation_depth(mut self, depth: u8) -> Self {
        self.delegation_depth = Some(depth);
        self
    }

    /// Expired once `now >= expiry`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
        }
    }
}

/// Authority the user delegated to an agent for a human-not-present session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAuthorization {
    pub session_id: String,
    pub agent_did: String,
    pub session_expiry: DateTime<Utc>,
    pub status: SessionStatus,
    /// Actions the session was opened for, e.g. `"purchase"`.
    #[serde(default)]
    pub intents: Vec<String>,
}

impl SessionAuthorization {
    pub fn new(
        session_id: impl Into<String>,
        agent_did: impl Into<String>,
        session_expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_did: agent_did.into(),
            session_expiry,
            status: SessionStatus::Active,
            intents: Vec::new(),
        }
    }

    pub fn for_intents<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intents = intents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartContents {
    pub line_items: Vec<PaymentItem>,
    pub total: PaymentItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
}

/// A merchant-signed cart. Any change to `contents` changes its reference hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartMandate {
    pub cart_id: String,
    pub contents: CartContents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_signature: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CartMandate {
    /// Build a cart whose total is the sum of its items, in the first item's
    /// currency (USD for an empty cart).
    pub fn from_items(cart_id: impl Into<String>, line_items: Vec<PaymentItem>) -> Self {
        let currency = line_items
            .first()
            .map(|i| i.amount.currency.clone())
            .unwrap_or_else(|| "USD".to_string());
        let sum: f64 = line_items.iter().map(|i| i.amount.value).sum();
        Self {
            cart_id: cart_id.into(),
            contents: CartContents {
                line_items,
                total: PaymentItem::new("Total", Money::new(currency, sum)),
                merchant_name: None,
            },
            merchant_signature: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_total(mut self, total: Money) -> Self {
        self.contents.total.amount = total;
        self
    }

    pub fn with_merchant(mut self, name: impl Into<String>) -> Self {
        self.contents.merchant_name = Some(name.into());
        self
    }

    pub fn signed(mut self, signature: impl Into<String>) -> Self {
        self.merchant_signature = Some(signature.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn total(&self) -> &Money {
        &self.contents.total.amount
    }
}

/// The user's authorization to pay for a specific cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMandate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_mandate_id: Option<String>,
    /// `sha256:<hex>` reference of the signed cart.
    pub cart_reference: String,
    pub amount: Money,
    /// Opaque descriptor (a method name string or a method object).
    pub payment_method: Value,
    /// `header.payload.signature`, base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_authorization: Option<String>,
    pub creation_time: DateTime<Utc>,
}

impl PaymentMandate {
    pub fn new(cart_reference: impl Into<String>, amount: Money, payment_method: Value) -> Self {
        Self {
            payment_mandate_id: None,
            cart_reference: cart_reference.into(),
            amount,
            payment_method,
            user_authorization: None,
            creation_time: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.payment_mandate_id = Some(id.into());
        self
    }

    pub fn authorized_by(mut self, token: impl Into<String>) -> Self {
        self.user_authorization = Some(token.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.creation_time = at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodData {
    pub supported_methods: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub id: String,
    #[serde(default)]
    pub display_items: Vec<PaymentItem>,
    pub total: PaymentItem,
}

/// A merchant's request for payment, before any mandate exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub method_data: Vec<PaymentMethodData>,
    pub details: PaymentDetails,
}

impl PaymentRequest {
    pub fn new(id: impl Into<String>, display_items: Vec<PaymentItem>, total: Money) -> Self {
        Self {
            method_data: Vec::new(),
            details: PaymentDetails {
                id: id.into(),
                display_items,
                total: PaymentItem::new("Total", total),
            },
        }
    }

    pub fn accepting(mut self, method: impl Into<String>) -> Self {
        self.method_data.push(PaymentMethodData {
            supported_methods: method.into(),
            data: None,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateKind {
    Intent,
    Cart,
    Payment,
}

impl MandateKind {
    pub fn data_key(self) -> &'static str {
        match self {
            Self::Intent => INTENT_MANDATE_DATA_KEY,
            Self::Cart => CART_MANDATE_DATA_KEY,
            Self::Payment => PAYMENT_MANDATE_DATA_KEY,
        }
    }

    pub fn from_data_key(key: &str) -> Option<Self> {
        match key {
            INTENT_MANDATE_DATA_KEY => Some(Self::Intent),
            CART_MANDATE_DATA_KEY => Some(Self::Cart),
            PAYMENT_MANDATE_DATA_KEY => Some(Self::Payment),
            _ => None,
        }
    }
}

impl std::fmt::Display for MandateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.data_key())
    }
}

/// An untrusted mandate as it arrived: the kind is known from its data key,
/// the body is still raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MandateObject {
    #[serde(rename = "ap2.mandates.IntentMandate")]
    Intent(Value),
    #[serde(rename = "ap2.mandates.CartMandate")]
    Cart(Value),
    #[serde(rename = "ap2.mandates.PaymentMandate")]
    Payment(Value),
}

impl MandateObject {
    pub fn new(kind: MandateKind, body: Value) -> Self {
        match kind {
            MandateKind::Intent => Self::Intent(body),
            MandateKind::Cart => Self::Cart(body),
            MandateKind::Payment => Self::Payment(body),
        }
    }

    /// Extract every mandate from a data part (`{"ap2.mandates.CartMandate": {...}, ...}`).
    /// Unrelated keys are ignored. Order follows Intent, Cart, Payment.
    pub fn from_data_part(part: &Value) -> Vec<Self> {
        let Some(obj) = part.as_object() else {
            return Vec::new();
        };
        [MandateKind::Intent, MandateKind::Cart, MandateKind::Payment]
            .into_iter()
            .filter_map(|kind| obj.get(kind.data_key()).map(|v| Self::new(kind, v.clone())))
            .collect()
    }

    pub fn kind(&self) -> MandateKind {
        match self {
            Self::Intent(_) => MandateKind::Intent,
            Self::Cart(_) => MandateKind::Cart,
            Self::Payment(_) => MandateKind::Payment,
        }
    }

    pub fn body(&self) -> &Value {
        match self {
            Self::Intent(v) | Self::Cart(v) | Self::Payment(v) => v,
        }
    }

    /// Wrap back into a single-key data part.
    pub fn to_data_part(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(self.kind().data_key().to_string(), self.body().clone());
        Value::Object(map)
    }
}

impl From<&IntentMandate> for MandateObject {
    fn from(m: &IntentMandate) -> Self {
        Self::Intent(serde_json::to_value(m).unwrap_or(Value::Null))
    }
}

impl From<&CartMandate> for MandateObject {
    fn from(m: &CartMandate) -> Self {
        Self::Cart(serde_json::to_value(m).unwrap_or(Value::Null))
    }
}

impl From<&PaymentMandate> for MandateObject {
    fn from(m: &PaymentMandate) -> Self {
        Self::Payment(serde_json::to_value(m).unwrap_or(Value::Null))
    }
}
