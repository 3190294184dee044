pub mod aggregate;
pub mod config;
pub mod digest;
pub mod errors;
pub mod fields;
pub mod legacy;
pub mod structural;
pub mod token;
pub mod types;

// Convenience re-exports
pub use aggregate::{AggregationMode, Aggregator, FnRule, RuleRegistry, ValidationRule};
pub use config::{ConfigError, ValidationConfig, ValidationConfigOverrides};
pub use digest::{
    compute_cart_reference, compute_cart_reference_value, compute_payment_reference,
    compute_payment_reference_value,
};
pub use errors::{ErrorBand, ErrorCode, ValidationError, ValidationResult};
pub use fields::FieldValidator;
pub use legacy::{validate_payment_mandate_signature, LegacyValidationError};
pub use structural::MandateValidator;
pub use token::{
    AuthorizationValidator, ParsedToken, SignatureVerifier, TokenInspection, VerificationRequest,
    VerifierError,
};
pub use types::{
    CartContents, CartMandate, IntentMandate, MandateKind, MandateObject, Money, PaymentDetails,
    PaymentItem, PaymentMandate, PaymentMethodData, PaymentRequest, SessionAuthorization,
    SessionStatus,
};
