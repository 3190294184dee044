use super::{security_error, TokenHeader, FIELD};
use crate::config::ValidationConfig;
use crate::errors::{join_path, ErrorCode, ValidationResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::{Map, Value};

/// Header members that would let a token choose its own verification key.
const DANGEROUS_HEADERS: [&str; 5] = ["crit", "jku", "jwk", "x5u", "x5c"];

/// Decode one base64url segment. Trailing padding is tolerated.
pub(crate) fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}

/// Decode a segment into a JSON object.
pub(crate) fn decode_object(segment: &str) -> Option<Map<String, Value>> {
    let bytes = decode_segment(segment)?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Algorithm policy and header hardening. Returns `None` (with an error
/// recorded) when the token must not be processed any further.
pub(crate) fn check_header_impl(
    config: &ValidationConfig,
    header: &Map<String, Value>,
    result: &mut ValidationResult,
) -> Option<TokenHeader> {
    let header_path = join_path(FIELD, "header");

    if let Some(key) = DANGEROUS_HEADERS.iter().find(|k| header.contains_key(**k)) {
        tracing::warn!(
            reason = "W_AUTH_HEADER",
            header = *key,
            "token carries a key-selection or critical header"
        );
        result.add_error(
            security_error(
                config,
                ErrorCode::SignatureInvalid,
                format!("Token header '{}' is not accepted", key),
            )
            .at(join_path(&header_path, key)),
        );
        return None;
    }

    let alg_path = join_path(&header_path, "alg");
    let alg = match header.get("alg") {
        Some(Value::String(alg)) => alg.clone(),
        _ => {
            tracing::warn!(reason = "W_AUTH_ALG", "token header has no algorithm");
            result.add_error(
                security_error(config, ErrorCode::SignatureInvalid, "Token algorithm is missing")
                    .at(alg_path),
            );
            return None;
        }
    };

    if config.is_denied_algorithm(&alg) {
        tracing::warn!(reason = "W_AUTH_ALG", alg = %alg, "insecure token algorithm rejected");
        result.add_error(
            security_error(
                config,
                ErrorCode::SignatureInvalid,
                format!("Algorithm '{}' is not allowed", alg),
            )
            .at(alg_path),
        );
        return None;
    }

    if !config.is_accepted_algorithm(&alg) {
        tracing::warn!(reason = "W_AUTH_ALG", alg = %alg, "token algorithm not accepted");
        result.add_error(
            security_error(
                config,
                ErrorCode::SignatureInvalid,
                format!("Algorithm '{}' is not accepted", alg),
            )
            .at(alg_path),
        );
        return None;
    }

    let typ = header.get("typ").and_then(Value::as_str).map(str::to_string);
    if let Some(t) = &typ {
        let accepted = config
            .accepted_token_types
            .iter()
            .any(|a| a.eq_ignore_ascii_case(t));
        if !accepted {
            tracing::warn!(reason = "W_AUTH_TYP", typ = %t, "unexpected token type");
            result.add_warning(format!("Token type '{}' is not one of the expected types", t));
        }
    }

    Some(TokenHeader {
        alg,
        typ,
        kid: header.get("kid").and_then(Value::as_str).map(str::to_string),
    })
}
