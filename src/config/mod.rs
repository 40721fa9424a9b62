//! Engine configuration.
//!
//! All settings have defaults and can be overridden through environment
//! variables. Values are validated once after loading, so components can
//! assume a sane configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::execution::{parse_memory_limit, ExecutionLimits, SandboxConfig, SandboxStrategy};
use crate::search::SearchConfig;

/// Smallest sandbox memory limit accepted, in MB.
const MIN_SANDBOX_MEMORY_MB: u64 = 32;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Generation oracle endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// Remote OpenAI-compatible endpoint. No remote model when unset.
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Local OpenAI-compatible endpoint, used for easy prompts.
    pub local_api_base: Option<String>,
    pub local_model: String,
    pub timeout: Duration,
    /// In-flight requests per generator.
    pub max_concurrent: usize,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            model: "deepseek-coder".to_string(),
            local_api_base: None,
            local_model: "qwen2.5-coder".to_string(),
            timeout: Duration::from_secs(30),
            max_concurrent: 5,
            temperature: 0.7,
        }
    }
}

impl LlmConfig {
    /// True when at least one endpoint is configured.
    pub fn has_endpoint(&self) -> bool {
        self.api_base.is_some() || self.local_api_base.is_some()
    }
}

/// Complete configuration of one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    /// Maximum number of cached prompts.
    pub cache_size: usize,
    /// Lifetime of a cached prompt from the time it was written.
    pub cache_ttl: Duration,
    /// Directory for `fail_cases.jsonl` and `success_cases.jsonl`.
    pub case_log_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            sandbox: SandboxConfig::default(),
            llm: LlmConfig::default(),
            cache_size: 128,
            cache_ttl: Duration::from_secs(300),
            case_log_dir: PathBuf::from("logs"),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MCTS_C`: UCB exploration constant (default: 1.4)
    /// - `MCTS_SIMULATIONS`: Simulations per run (default: 30)
    /// - `MCTS_CANDIDATES`: Candidates per expansion (default: 3)
    /// - `MCTS_RETRIEVAL_K`: Past failures per prompt (default: 3)
    /// - `SANDBOX_IMAGE`: Docker image (default: python:3.10-slim)
    /// - `SANDBOX_TIMEOUT`: Wall-clock timeout in seconds (default: 10)
    /// - `SANDBOX_MEM_LIMIT`: Memory limit such as `256m` or `1g` (default: 256m)
    /// - `SANDBOX_CPU_QUOTA`: CPU quota against a 100000 period (default: 100000)
    /// - `SANDBOX_PIDS_LIMIT`: Process limit (default: 64)
    /// - `SANDBOX_STRATEGY`: `persistent` or `ephemeral` (default: persistent)
    /// - `SANDBOX_USER`: User programs run as, empty for the image default (default: nobody)
    /// - `LLM_API_BASE`, `LLM_API_KEY`, `LLM_MODEL`: Remote model (default model: deepseek-coder)
    /// - `LOCAL_LLM_API_BASE`, `LOCAL_LLM_MODEL`: Local model (default model: qwen2.5-coder)
    /// - `LLM_TIMEOUT`: Request timeout in seconds (default: 30)
    /// - `LLM_MAX_CONCURRENT`: In-flight requests per generator (default: 5)
    /// - `LLM_TEMPERATURE`: Sampling temperature (default: 0.7)
    /// - `CANDIDATE_CACHE_SIZE`: Cached prompts (default: 128)
    /// - `CANDIDATE_CACHE_TTL_SECS`: Cache entry lifetime (default: 300)
    /// - `CASE_LOG_DIR`: Case log directory (default: logs)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Search settings
        if let Some(val) = lookup("MCTS_C") {
            config.search.exploration_c = parse_env_value(&val, "MCTS_C")?;
        }
        if let Some(val) = lookup("MCTS_SIMULATIONS") {
            config.search.simulations = parse_env_value(&val, "MCTS_SIMULATIONS")?;
        }
        if let Some(val) = lookup("MCTS_CANDIDATES") {
            config.search.candidates = parse_env_value(&val, "MCTS_CANDIDATES")?;
        }
        if let Some(val) = lookup("MCTS_RETRIEVAL_K") {
            config.search.retrieval_k = parse_env_value(&val, "MCTS_RETRIEVAL_K")?;
        }

        // Sandbox settings
        let mut limits = ExecutionLimits::default();
        if let Some(val) = lookup("SANDBOX_IMAGE") {
            config.sandbox.image = val;
        }
        if let Some(val) = lookup("SANDBOX_TIMEOUT") {
            limits.timeout_seconds = parse_env_value(&val, "SANDBOX_TIMEOUT")?;
        }
        if let Some(val) = lookup("SANDBOX_MEM_LIMIT") {
            limits.memory_mb =
                parse_memory_limit(&val).ok_or_else(|| ConfigError::InvalidValue {
                    key: "SANDBOX_MEM_LIMIT".to_string(),
                    message: format!("could not parse memory limit '{}'", val),
                })?;
        }
        if let Some(val) = lookup("SANDBOX_CPU_QUOTA") {
            let quota: i64 = parse_env_value(&val, "SANDBOX_CPU_QUOTA")?;
            limits.cpu_cores = ExecutionLimits::cores_from_quota(quota);
        }
        if let Some(val) = lookup("SANDBOX_PIDS_LIMIT") {
            limits.max_processes = parse_env_value(&val, "SANDBOX_PIDS_LIMIT")?;
        }
        config.sandbox.limits = limits;
        if let Some(val) = lookup("SANDBOX_STRATEGY") {
            config.sandbox.strategy = val
                .parse::<SandboxStrategy>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "SANDBOX_STRATEGY".to_string(),
                    message,
                })?;
        }
        if let Some(val) = lookup("SANDBOX_USER") {
            let user = val.trim();
            config.sandbox.user = (!user.is_empty()).then(|| user.to_string());
        }

        // LLM settings
        config.llm.api_base = lookup("LLM_API_BASE").filter(|v| !v.trim().is_empty());
        config.llm.api_key = lookup("LLM_API_KEY").filter(|v| !v.trim().is_empty());
        if let Some(val) = lookup("LLM_MODEL") {
            config.llm.model = val;
        }
        config.llm.local_api_base =
            lookup("LOCAL_LLM_API_BASE").filter(|v| !v.trim().is_empty());
        if let Some(val) = lookup("LOCAL_LLM_MODEL") {
            config.llm.local_model = val;
        }
        if let Some(val) = lookup("LLM_TIMEOUT") {
            let secs: u64 = parse_env_value(&val, "LLM_TIMEOUT")?;
            config.llm.timeout = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("LLM_MAX_CONCURRENT") {
            config.llm.max_concurrent = parse_env_value(&val, "LLM_MAX_CONCURRENT")?;
        }
        if let Some(val) = lookup("LLM_TEMPERATURE") {
            config.llm.temperature = parse_env_value(&val, "LLM_TEMPERATURE")?;
        }

        // Cache and logs
        if let Some(val) = lookup("CANDIDATE_CACHE_SIZE") {
            config.cache_size = parse_env_value(&val, "CANDIDATE_CACHE_SIZE")?;
        }
        if let Some(val) = lookup("CANDIDATE_CACHE_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "CANDIDATE_CACHE_TTL_SECS")?;
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("CASE_LOG_DIR") {
            config.case_log_dir = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Search validation
        if self.search.simulations == 0 {
            return Err(ConfigError::ValidationFailed(
                "simulations must be greater than 0".to_string(),
            ));
        }

        if self.search.candidates == 0 {
            return Err(ConfigError::ValidationFailed(
                "candidates must be greater than 0".to_string(),
            ));
        }

        if !self.search.exploration_c.is_finite() || self.search.exploration_c < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "exploration constant must be a non-negative number".to_string(),
            ));
        }

        // Sandbox validation
        if self.sandbox.image.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "sandbox image cannot be empty".to_string(),
            ));
        }

        if self.sandbox.limits.timeout_seconds == 0 {
            return Err(ConfigError::ValidationFailed(
                "sandbox timeout must be greater than 0".to_string(),
            ));
        }

        if self.sandbox.limits.memory_mb < MIN_SANDBOX_MEMORY_MB {
            return Err(ConfigError::ValidationFailed(format!(
                "sandbox memory must be at least {} MB",
                MIN_SANDBOX_MEMORY_MB
            )));
        }

        if self.sandbox.limits.cpu_cores <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "sandbox CPU quota must be greater than 0".to_string(),
            ));
        }

        // LLM validation
        if self.llm.timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "LLM timeout must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_concurrent == 0 {
            return Err(ConfigError::ValidationFailed(
                "LLM max concurrency must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        // Cache validation
        if self.cache_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "cache size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the search budget.
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Builder method to set the sandbox configuration.
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Builder method to set the case log directory.
    pub fn with_case_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.case_log_dir = dir.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!((config.search.exploration_c - 1.4).abs() < f64::EPSILON);
        assert_eq!(config.search.simulations, 30);
        assert_eq!(config.search.candidates, 3);
        assert_eq!(config.search.retrieval_k, 3);
        assert_eq!(config.sandbox.image, "python:3.10-slim");
        assert_eq!(config.sandbox.limits.memory_mb, 256);
        assert_eq!(config.sandbox.limits.timeout_seconds, 10);
        assert_eq!(config.sandbox.strategy, SandboxStrategy::Persistent);
        assert_eq!(config.llm.model, "deepseek-coder");
        assert_eq!(config.cache_size, 128);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(!config.llm.has_endpoint());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.search, SearchConfig::default());
        assert_eq!(config.llm, LlmConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("MCTS_C", "2.0"),
            ("MCTS_SIMULATIONS", "50"),
            ("MCTS_CANDIDATES", "5"),
            ("SANDBOX_TIMEOUT", "20"),
            ("SANDBOX_MEM_LIMIT", "1g"),
            ("SANDBOX_CPU_QUOTA", "50000"),
            ("SANDBOX_PIDS_LIMIT", "32"),
            ("SANDBOX_STRATEGY", "ephemeral"),
            ("SANDBOX_USER", ""),
            ("LLM_API_BASE", "http://localhost:4000/v1"),
            ("LLM_TIMEOUT", "60"),
            ("CANDIDATE_CACHE_SIZE", "16"),
            ("CASE_LOG_DIR", "/tmp/cases"),
        ])
        .unwrap();

        assert!((config.search.exploration_c - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.search.simulations, 50);
        assert_eq!(config.search.candidates, 5);
        assert_eq!(config.sandbox.limits.timeout_seconds, 20);
        assert_eq!(config.sandbox.limits.memory_mb, 1024);
        assert!((config.sandbox.limits.cpu_cores - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.sandbox.limits.max_processes, 32);
        assert_eq!(config.sandbox.strategy, SandboxStrategy::Ephemeral);
        assert_eq!(config.sandbox.user, None);
        assert_eq!(config.llm.api_base.as_deref(), Some("http://localhost:4000/v1"));
        assert_eq!(config.llm.timeout, Duration::from_secs(60));
        assert_eq!(config.cache_size, 16);
        assert_eq!(config.case_log_dir, PathBuf::from("/tmp/cases"));
    }

    #[test]
    fn test_invalid_values() {
        let err = from_map(&[("MCTS_SIMULATIONS", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MCTS_SIMULATIONS"));

        let err = from_map(&[("SANDBOX_MEM_LIMIT", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = from_map(&[("SANDBOX_STRATEGY", "pooled")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validation_failures() {
        for vars in [
            [("MCTS_SIMULATIONS", "0")],
            [("MCTS_CANDIDATES", "0")],
            [("MCTS_C", "-1")],
            [("MCTS_C", "NaN")],
            [("SANDBOX_TIMEOUT", "0")],
            [("SANDBOX_MEM_LIMIT", "16m")],
            [("LLM_TEMPERATURE", "3.5")],
        ] {
            let err = from_map(&vars).unwrap_err();
            assert!(
                matches!(err, ConfigError::ValidationFailed(_)),
                "{:?} should fail validation",
                vars
            );
        }
    }

    #[test]
    fn test_blank_endpoint_is_unset() {
        let config = from_map(&[("LLM_API_BASE", "  "), ("LOCAL_LLM_API_BASE", "http://127.0.0.1:8000/v1")])
            .unwrap();
        assert!(config.llm.api_base.is_none());
        assert!(config.llm.has_endpoint());
    }
}
