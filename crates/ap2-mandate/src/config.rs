//! Validation configuration.
//!
//! One immutable [`ValidationConfig`] is owned by each validator instance.
//! Invalid configuration is a programmer error and surfaces as [`ConfigError`]
//! at construction time; validation itself never fails.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// ISO 4217 codes accepted out of the box.
pub const DEFAULT_CURRENCIES: [&str; 20] = [
    "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "SEK", "NZD", "MXN", "SGD", "HKD",
    "NOK", "TRY", "RUB", "INR", "BRL", "ZAR", "KRW",
];

pub const ENV_MAX_AMOUNT: &str = "AP2_MAX_AMOUNT";
pub const ENV_SUPPORTED_CURRENCIES: &str = "AP2_SUPPORTED_CURRENCIES";
pub const ENV_EXPECTED_AUDIENCE: &str = "AP2_EXPECTED_AUDIENCE";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("supported currency set must not be empty")]
    EmptyCurrencySet,

    #[error("currency '{0}' is not a 3-letter upper-case ISO 4217 code")]
    InvalidCurrency(String),

    #[error("max_amount must be finite and positive, got {0}")]
    InvalidMaxAmount(f64),

    #[error("total_epsilon must be finite and non-negative, got {0}")]
    InvalidEpsilon(f64),

    #[error("max_string_length must be greater than zero")]
    ZeroStringLength,

    #[error("accepted algorithm list must not be empty")]
    NoAcceptedAlgorithms,

    #[error("algorithm '{0}' is both accepted and denied")]
    AlgorithmConflict(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("rule '{0}' is already registered")]
    DuplicateRule(String),
}

/// Validation limits and token policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub supported_currencies: BTreeSet<String>,
    /// Per-transaction ceiling, in major units.
    pub max_amount: f64,
    pub max_string_length: usize,
    pub max_line_items: usize,
    /// Tolerance for `sum(line_items) == total`.
    pub total_epsilon: f64,
    pub accepted_algorithms: Vec<String>,
    /// Matched case-insensitively.
    pub denied_algorithms: Vec<String>,
    pub accepted_token_types: Vec<String>,
    pub expected_audience: Option<String>,
    pub clock_skew_seconds: u64,
    pub verifier_timeout_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            supported_currencies: DEFAULT_CURRENCIES.iter().map(|c| c.to_string()).collect(),
            max_amount: 1_000_000.0,
            max_string_length: 1000,
            max_line_items: 1000,
            total_epsilon: 0.005,
            accepted_algorithms: ["ES256", "ES256K", "ES384", "EdDSA", "RS256", "PS256"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            denied_algorithms: ["none", "HS256", "HS384", "HS512"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            accepted_token_types: ["JWT", "kb+jwt", "vc+sd-jwt"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            expected_audience: None,
            clock_skew_seconds: 30,
            verifier_timeout_ms: 2_000,
        }
    }
}

/// Partial overrides for `ValidationConfig`, e.g. from a deployment file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfigOverrides {
    pub supported_currencies: Option<BTreeSet<String>>,
    pub max_amount: Option<f64>,
    pub max_string_length: Option<usize>,
    pub max_line_items: Option<usize>,
    pub total_epsilon: Option<f64>,
    pub accepted_algorithms: Option<Vec<String>>,
    pub denied_algorithms: Option<Vec<String>>,
    pub accepted_token_types: Option<Vec<String>>,
    pub expected_audience: Option<String>,
    pub clock_skew_seconds: Option<u64>,
    pub verifier_timeout_ms: Option<u64>,
}

impl ValidationConfig {
    /// Apply overrides onto this configuration. Only `Some` values override.
    pub fn apply(self, overrides: ValidationConfigOverrides) -> Self {
        Self {
            supported_currencies: overrides
                .supported_currencies
                .unwrap_or(self.supported_currencies),
            max_amount: overrides.max_amount.unwrap_or(self.max_amount),
            max_string_length: overrides
                .max_string_length
                .unwrap_or(self.max_string_length),
            max_line_items: overrides.max_line_items.unwrap_or(self.max_line_items),
            total_epsilon: overrides.total_epsilon.unwrap_or(self.total_epsilon),
            accepted_algorithms: overrides
                .accepted_algorithms
                .unwrap_or(self.accepted_algorithms),
            denied_algorithms: overrides.denied_algorithms.unwrap_or(self.denied_algorithms),
            accepted_token_types: overrides
                .accepted_token_types
                .unwrap_or(self.accepted_token_types),
            expected_audience: overrides.expected_audience.or(self.expected_audience),
            clock_skew_seconds: overrides
                .clock_skew_seconds
                .unwrap_or(self.clock_skew_seconds),
            verifier_timeout_ms: overrides
                .verifier_timeout_ms
                .unwrap_or(self.verifier_timeout_ms),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_currencies.is_empty() {
            return Err(ConfigError::EmptyCurrencySet);
        }
        for code in &self.supported_currencies {
            if !is_currency_shape(code) {
                return Err(ConfigError::InvalidCurrency(code.clone()));
            }
        }
        if !self.max_amount.is_finite() || self.max_amount <= 0.0 {
            return Err(ConfigError::InvalidMaxAmount(self.max_amount));
        }
        if !self.total_epsilon.is_finite() || self.total_epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.total_epsilon));
        }
        if self.max_string_length == 0 {
            return Err(ConfigError::ZeroStringLength);
        }
        if self.accepted_algorithms.is_empty() {
            return Err(ConfigError::NoAcceptedAlgorithms);
        }
        for alg in &self.accepted_algorithms {
            if self.is_denied_algorithm(alg) {
                return Err(ConfigError::AlgorithmConflict(alg.clone()));
            }
        }
        Ok(())
    }

    pub fn is_denied_algorithm(&self, alg: &str) -> bool {
        // "none" is denied regardless of configuration.
        alg.eq_ignore_ascii_case("none")
            || self
                .denied_algorithms
                .iter()
                .any(|d| d.eq_ignore_ascii_case(alg))
    }

    pub fn is_accepted_algorithm(&self, alg: &str) -> bool {
        !self.is_denied_algorithm(alg) && self.accepted_algorithms.iter().any(|a| a == alg)
    }

    pub fn verifier_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.verifier_timeout_ms)
    }

    /// Parse YAML (partial documents fall back to defaults).
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let overrides: ValidationConfigOverrides =
            serde_yaml::from_str(yaml).context("failed to parse validation config")?;
        let cfg = Self::default().apply(overrides);
        cfg.validate().context("invalid validation config")?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Apply `AP2_*` environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `AP2_*` overrides from an arbitrary lookup. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(ENV_MAX_AMOUNT) {
            match v.trim().parse::<f64>() {
                Ok(amount) => self.max_amount = amount,
                Err(_) => tracing::warn!(
                    reason = "W_CONFIG_ENV",
                    var = ENV_MAX_AMOUNT,
                    "ignoring unparseable value '{}'",
                    v
                ),
            }
        }

        if let Some(v) = lookup(ENV_SUPPORTED_CURRENCIES) {
            let set: BTreeSet<String> = v
                .split(',')
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
            if set.is_empty() {
                tracing::warn!(
                    reason = "W_CONFIG_ENV",
                    var = ENV_SUPPORTED_CURRENCIES,
                    "ignoring empty currency list"
                );
            } else {
                self.supported_currencies = set;
            }
        }

        if let Some(v) = lookup(ENV_EXPECTED_AUDIENCE) {
            let v = v.trim();
            if !v.is_empty() {
                self.expected_audience = Some(v.to_string());
            }
        }

        self
    }
}

pub(crate) fn is_currency_shape(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ValidationConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.supported_currencies.len(), 20);
        assert!(cfg.supported_currencies.contains("KRW"));
        assert_eq!(cfg.max_amount, 1_000_000.0);
        assert_eq!(cfg.total_epsilon, 0.005);
    }

    #[test]
    fn test_empty_currency_set_is_fatal() {
        let cfg = ValidationConfig {
            supported_currencies: BTreeSet::new(),
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyCurrencySet));
    }

    #[test]
    fn test_lowercase_currency_is_rejected() {
        let cfg = ValidationConfig::default().apply(ValidationConfigOverrides {
            supported_currencies: Some(["usd".to_string()].into_iter().collect()),
            ..Default::default()
        });
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidCurrency("usd".into()))
        );
    }

    #[test]
    fn test_none_cannot_be_accepted() {
        let cfg = ValidationConfig {
            accepted_algorithms: vec!["NONE".into()],
            denied_algorithms: vec![],
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::AlgorithmConflict("NONE".into()))
        );
        assert!(!cfg.is_accepted_algorithm("NONE"));
    }

    #[test]
    fn test_denied_is_case_insensitive() {
        let cfg = ValidationConfig::default();
        assert!(cfg.is_denied_algorithm("hs256"));
        assert!(cfg.is_denied_algorithm("None"));
        assert!(!cfg.is_denied_algorithm("ES256K"));
        assert!(cfg.is_accepted_algorithm("ES256K"));
        assert!(!cfg.is_accepted_algorithm("es256k"));
    }

    #[test]
    fn test_overrides_only_replace_some() {
        let cfg = ValidationConfig::default().apply(ValidationConfigOverrides {
            max_amount: Some(500.0),
            ..Default::default()
        });
        assert_eq!(cfg.max_amount, 500.0);
        assert_eq!(cfg.max_line_items, 1000);
    }

    #[test]
    fn test_yaml_rejects_unknown_keys() {
        let err = ValidationConfig::from_yaml_str("max_amont: 10\n").unwrap_err();
        assert!(format!("{:#}", err).contains("max_amont"));
    }

    #[test]
    fn test_yaml_file_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "max_amount: 250.0\nsupported_currencies: [USD, EUR]\nexpected_audience: merchant.example"
        )
        .unwrap();

        let cfg = ValidationConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(cfg.max_amount, 250.0);
        assert_eq!(cfg.supported_currencies.len(), 2);
        assert_eq!(cfg.expected_audience.as_deref(), Some("merchant.example"));
    }

    #[test]
    fn test_yaml_invalid_config_is_error() {
        assert!(ValidationConfig::from_yaml_str("max_amount: -1\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_MAX_AMOUNT, "42.5"),
            (ENV_SUPPORTED_CURRENCIES, "usd, eur ,,"),
            (ENV_EXPECTED_AUDIENCE, "shop"),
        ]
        .into_iter()
        .collect();

        let cfg = ValidationConfig::default()
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.max_amount, 42.5);
        assert_eq!(
            cfg.supported_currencies.iter().cloned().collect::<Vec<_>>(),
            vec!["EUR".to_string(), "USD".to_string()]
        );
        assert_eq!(cfg.expected_audience.as_deref(), Some("shop"));
    }

    #[test]
    fn test_env_garbage_is_ignored() {
        let cfg = ValidationConfig::default().apply_env_from(|k| {
            (k == ENV_MAX_AMOUNT).then(|| "lots".to_string())
        });
        assert_eq!(cfg.max_amount, 1_000_000.0);
    }
}
