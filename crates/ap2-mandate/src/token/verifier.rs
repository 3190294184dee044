use async_trait::async_trait;

/// Everything a signature scheme needs to check one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Header `alg`, already checked against the algorithm policy.
    pub algorithm: String,
    /// Header `kid`, when present.
    pub key_id: Option<String>,
    /// `base64url(header) + "." + base64url(payload)`, exactly as received.
    pub signing_input: Vec<u8>,
    /// Raw third segment, still base64url-encoded.
    pub signature: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("verification backend unavailable: {0}")]
    Unavailable(String),

    #[error("verification failed: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Pluggable signature verification.
///
/// `Ok(false)` means the signature does not verify. `Err` means no verdict
/// could be reached; callers treat it as a system fault, never as valid.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<bool, VerifierError>;
}
