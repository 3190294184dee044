//! Result aggregation and the named rule registry.
//!
//! Combined results are valid only if every component is, with errors and
//! warnings concatenated in component order. In [`AggregationMode::FailFast`]
//! no further component runs after the first invalid one; the result shape is
//! the same in both modes.

use crate::config::ConfigError;
use crate::errors::ValidationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    FailFast,
    #[default]
    CollectAll,
}

/// One named validation capability.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, input: &Value) -> ValidationResult;
}

/// A rule backed by a closure.
pub struct FnRule<F> {
    name: String,
    f: F,
}

impl<F> FnRule<F>
where
    F: Fn(&Value) -> ValidationResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&Value) -> ValidationResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, input: &Value) -> ValidationResult {
        (self.f)(input)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    mode: AggregationMode,
}

impl Aggregator {
    pub fn new(mode: AggregationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Fold `next` into `acc`. Returns whether further components should run.
    pub fn absorb(&self, acc: &mut ValidationResult, next: ValidationResult) -> bool {
        acc.merge(next);
        self.should_continue(acc)
    }

    pub fn should_continue(&self, acc: &ValidationResult) -> bool {
        self.mode == AggregationMode::CollectAll || acc.is_valid
    }

    /// Merge already-computed results.
    pub fn merge<I>(&self, results: I) -> ValidationResult
    where
        I: IntoIterator<Item = ValidationResult>,
    {
        let mut acc = ValidationResult::valid();
        for r in results {
            if !self.absorb(&mut acc, r) {
                break;
            }
        }
        acc
    }

    /// Run components lazily, stopping early in fail-fast mode.
    pub fn run<'a, I>(&self, steps: I) -> ValidationResult
    where
        I: IntoIterator<Item = Box<dyn FnOnce() -> ValidationResult + 'a>>,
    {
        let mut acc = ValidationResult::valid();
        for step in steps {
            if !self.absorb(&mut acc, step()) {
                break;
            }
        }
        acc
    }
}

/// Named rules, evaluated in registration order.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.names())
            .finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: impl ValidationRule + 'static) -> Result<(), ConfigError> {
        self.register_shared(Arc::new(rule))
    }

    pub fn register_shared(&mut self, rule: Arc<dyn ValidationRule>) -> Result<(), ConfigError> {
        if self.get(rule.name()).is_some() {
            return Err(ConfigError::DuplicateRule(rule.name().to_string()));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn with_rule(mut self, rule: impl ValidationRule + 'static) -> Result<Self, ConfigError> {
        self.register(rule)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ValidationRule>> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, input: &Value, mode: AggregationMode) -> ValidationResult {
        let aggregator = Aggregator::new(mode);
        let mut acc = ValidationResult::valid();
        for rule in &self.rules {
            let result = rule.validate(input);
            if !result.is_valid {
                tracing::debug!(rule = rule.name(), errors = result.errors.len(), "rule failed");
            }
            if !aggregator.absorb(&mut acc, result) {
                break;
            }
        }
        acc
    }
}
