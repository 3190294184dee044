//! Runtime configuration for the transaction engine.

use anyhow::Context as _;
use ap2_mandate::{AggregationMode, ValidationConfig, ValidationConfigOverrides};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SECURITY_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub validation: ValidationConfig,
    /// Security-band failures per context before completion is refused.
    /// Zero disables the limit.
    pub security_failure_threshold: u32,
    /// How completion checks are combined.
    pub completion_mode: AggregationMode,
    /// SQLite file for accepted nonces. In-memory when unset.
    pub nonce_db: Option<PathBuf>,
    /// NDJSON task event log. Events are dropped when unset.
    pub event_log: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validation: ValidationConfig::default(),
            security_failure_threshold: DEFAULT_SECURITY_FAILURE_THRESHOLD,
            completion_mode: AggregationMode::CollectAll,
            nonce_db: None,
            event_log: None,
        }
    }
}

/// File shape: every key optional, unknown keys rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfigOverrides {
    pub validation: Option<ValidationConfigOverrides>,
    pub security_failure_threshold: Option<u32>,
    pub completion_mode: Option<AggregationMode>,
    pub nonce_db: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn apply(self, overrides: RuntimeConfigOverrides) -> Self {
        Self {
            validation: match overrides.validation {
                Some(v) => self.validation.apply(v),
                None => self.validation,
            },
            security_failure_threshold: overrides
                .security_failure_threshold
                .unwrap_or(self.security_failure_threshold),
            completion_mode: overrides.completion_mode.unwrap_or(self.completion_mode),
            nonce_db: overrides.nonce_db.or(self.nonce_db),
            event_log: overrides.event_log.or(self.event_log),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let overrides: RuntimeConfigOverrides =
            serde_yaml::from_str(yaml).context("failed to parse runtime config")?;
        let cfg = Self::default().apply(overrides);
        cfg.validation
            .validate()
            .context("invalid validation config")?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Apply `AP2_*` environment overrides to the validation section.
    pub fn with_env_overrides(mut self) -> Self {
        self.validation = self.validation.with_env_overrides();
        self
    }
}
