//! Engine configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (`MATCHING_*`, `OPENAI_API_KEY`)
//! 3. TOML config file (`--config`)
//! 4. Built-in defaults
//!
//! `validate()` runs after all layers are applied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use workflow_core::decider::DEFAULT_CONFIDENCE_THRESHOLD;
use workflow_core::{RefinementDecider, RetryPolicy, DEFAULT_MAX_ITERATIONS};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4-0125-preview";
const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
const DEFAULT_ANALYSIS_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STORE_DIR: &str = ".matching-state";

const ENV_BASE_URL: &str = "MATCHING_BASE_URL";
const ENV_API_KEY: &str = "MATCHING_API_KEY";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_MODEL: &str = "MATCHING_MODEL";
const ENV_MAX_CONCURRENT_CALLS: &str = "MATCHING_MAX_CONCURRENT_CALLS";
const ENV_CALL_TIMEOUT_SECS: &str = "MATCHING_CALL_TIMEOUT_SECS";
const ENV_STORE_DIR: &str = "MATCHING_STORE_DIR";

/// Completion endpoint and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub generation_temperature: f32,
    /// Used for evaluation, analysis and refinement.
    pub analysis_temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            generation_temperature: DEFAULT_GENERATION_TEMPERATURE,
            analysis_temperature: DEFAULT_ANALYSIS_TEMPERATURE,
        }
    }
}

/// Loop policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_iterations: u32,
    pub confidence_threshold: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Limits applied around every model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_concurrent_calls: usize,
    pub call_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON documents in `dir`.
    File,
    /// RocksDB database in `dir` (requires the `heavy-state` feature).
    Rocks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_STORE_DIR),
            backend: StoreBackend::File,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: ModelConfig,
    pub workflow: WorkflowConfig,
    pub resilience: ResilienceConfig,
    pub store: StoreConfig,
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}={:?}: {}", name, value, e))
}

impl EngineConfig {
    /// Defaults, then the TOML file (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.model.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY).or_else(|| lookup(ENV_OPENAI_API_KEY)) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model.model = model;
        }
        if let Some(v) = lookup(ENV_MAX_CONCURRENT_CALLS) {
            self.resilience.max_concurrent_calls = parse_env(ENV_MAX_CONCURRENT_CALLS, v)?;
        }
        if let Some(v) = lookup(ENV_CALL_TIMEOUT_SECS) {
            self.resilience.call_timeout_secs = parse_env(ENV_CALL_TIMEOUT_SECS, v)?;
        }
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.store.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.base_url.trim().is_empty() {
            bail!("model.base_url must not be empty");
        }
        if self.model.model.trim().is_empty() {
            bail!("model.model must not be empty");
        }
        for (name, t) in [
            ("generation_temperature", self.model.generation_temperature),
            ("analysis_temperature", self.model.analysis_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                bail!("model.{} must be within 0..=2, got {}", name, t);
            }
        }
        if self.workflow.max_iterations == 0 {
            bail!("workflow.max_iterations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.workflow.confidence_threshold) {
            bail!(
                "workflow.confidence_threshold must be within 0..=1, got {}",
                self.workflow.confidence_threshold
            );
        }
        if self.resilience.max_concurrent_calls == 0 {
            bail!("resilience.max_concurrent_calls must be at least 1");
        }
        if self.resilience.call_timeout_secs == 0 {
            bail!("resilience.call_timeout_secs must be at least 1");
        }
        if self.resilience.retry.backoff_multiplier < 1.0 {
            bail!("resilience.retry.backoff_multiplier must be >= 1.0");
        }
        if self.store.backend == StoreBackend::Rocks && !cfg!(feature = "heavy-state") {
            bail!("store.backend = \"rocks\" requires the heavy-state feature");
        }
        Ok(())
    }

    pub fn decider(&self) -> RefinementDecider {
        RefinementDecider::new(
            self.workflow.max_iterations,
            self.workflow.confidence_threshold,
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.resilience.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.model.model, "gpt-4-0125-preview");
        assert_eq!(config.workflow.max_iterations, 4);
        assert_eq!(config.resilience.max_concurrent_calls, 4);
        assert_eq!(config.resilience.retry.max_retries, 2);
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
        assert!((config.decider().confidence_threshold - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml(
            r#"
            [model]
            base_url = "http://localhost:8000/v1"

            [workflow]
            max_iterations = 2

            [resilience.retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.model.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert_eq!(config.workflow.max_iterations, 2);
        assert!((config.workflow.confidence_threshold - 0.7).abs() < 1e-9);
        assert_eq!(config.resilience.retry.max_retries, 5);
        assert_eq!(config.resilience.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = EngineConfig::from_toml("[model]\nmodel = \"from-file\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("MATCHING_MODEL", "from-env"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("MATCHING_MAX_CONCURRENT_CALLS", "8"),
            ("MATCHING_STORE_DIR", "/tmp/matching"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.model.model, "from-env");
        assert_eq!(config.model.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.resilience.max_concurrent_calls, 8);
        assert_eq!(config.store.dir, PathBuf::from("/tmp/matching"));
    }

    #[test]
    fn test_matching_key_wins_over_openai_key() {
        let mut config = EngineConfig::default();
        config
            .apply_env(|k| match k {
                "MATCHING_API_KEY" => Some("sk-matching".into()),
                "OPENAI_API_KEY" => Some("sk-openai".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.model.api_key.as_deref(), Some("sk-matching"));
    }

    #[test]
    fn test_bad_env_number_is_an_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env(|k| (k == "MATCHING_CALL_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MATCHING_CALL_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.workflow.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.resilience.max_concurrent_calls = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = EngineConfig::default();
        config.model.api_key = Some("sk-secret".into());
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("sk-secret"));
    }
}
