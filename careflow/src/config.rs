//! Pipeline configuration.
//!
//! [`PipelineConfig`] is a serde struct with per-field defaults, so a config
//! file only needs the keys it overrides:
//!
//! ```
//! use careflow::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{"lookup_timeout_ms": 250}"#).unwrap();
//! assert_eq!(config.lookup_timeout_ms, 250);
//! assert_eq!(config.default_focus, "general consultation");
//! ```

use crate::errors::{CareflowError, Result};
use crate::state::DEFAULT_FOCUS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Disclaimer appended to every reviewed answer.
pub const DEFAULT_DISCLAIMER: &str =
    "This is not a definitive diagnosis. Please consult a qualified healthcare professional.";

/// Timeouts, texts and adapter settings for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for one record lookup, in milliseconds.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    /// Deadline for one generation call (block or whole stream), in milliseconds.
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    /// Deadline for one audit write, in milliseconds.
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
    /// Focus used when a request does not carry one.
    #[serde(default = "default_focus")]
    pub default_focus: String,
    /// Disclaimer the safety reviewer guarantees in its output.
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
    /// Follow-up actions attached to every outcome.
    #[serde(default = "default_recommended_actions")]
    pub recommended_actions: Vec<String>,
    /// Settings for the HTTP adapters.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_lookup_timeout_ms() -> u64 {
    5_000
}

fn default_generation_timeout_ms() -> u64 {
    60_000
}

fn default_audit_timeout_ms() -> u64 {
    5_000
}

fn default_focus() -> String {
    DEFAULT_FOCUS.to_string()
}

fn default_disclaimer() -> String {
    DEFAULT_DISCLAIMER.to_string()
}

fn default_recommended_actions() -> Vec<String> {
    vec![
        "Follow the guidance in the report".to_string(),
        "Schedule a follow-up appointment".to_string(),
    ]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            generation_timeout_ms: default_generation_timeout_ms(),
            audit_timeout_ms: default_audit_timeout_ms(),
            default_focus: default_focus(),
            disclaimer: default_disclaimer(),
            recommended_actions: default_recommended_actions(),
            http: HttpConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON, or a config error if
    /// validation fails.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise see
    /// [`PipelineConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks that every timeout is non-zero and every text is present.
    ///
    /// # Errors
    ///
    /// Returns [`CareflowError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("lookup_timeout_ms", self.lookup_timeout_ms),
            ("generation_timeout_ms", self.generation_timeout_ms),
            ("audit_timeout_ms", self.audit_timeout_ms),
        ] {
            if value == 0 {
                return Err(CareflowError::config(format!("{field} must be greater than zero")));
            }
        }
        if self.default_focus.trim().is_empty() {
            return Err(CareflowError::config("default_focus must not be empty"));
        }
        if self.disclaimer.trim().is_empty() {
            return Err(CareflowError::config("disclaimer must not be empty"));
        }
        self.http.validate()
    }

    /// Sets the lookup timeout.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the generation timeout.
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the audit timeout.
    #[must_use]
    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the disclaimer.
    #[must_use]
    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.disclaimer = disclaimer.into();
        self
    }

    /// Sets the default focus.
    #[must_use]
    pub fn with_default_focus(mut self, focus: impl Into<String>) -> Self {
        self.default_focus = focus.into();
        self
    }

    /// Sets the recommended actions.
    #[must_use]
    pub fn with_recommended_actions(mut self, actions: Vec<String>) -> Self {
        self.recommended_actions = actions;
        self
    }

    /// Sets the HTTP adapter settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Gets the lookup timeout as Duration.
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Gets the generation timeout as Duration.
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Gets the audit timeout as Duration.
    #[must_use]
    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Endpoints and model settings for the HTTP adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the record store; the subject id is appended as a path segment.
    #[serde(default = "default_records_base_url")]
    pub records_base_url: String,
    /// URL audit records are posted to.
    #[serde(default = "default_audit_url")]
    pub audit_url: String,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_generation_url")]
    pub generation_url: String,
    /// Model name sent with each generation request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the generation API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Cap on generated tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_records_base_url() -> String {
    "http://localhost:8001/api/patients".to_string()
}

fn default_audit_url() -> String {
    "http://localhost:5000/api/audit".to_string()
}

fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            records_base_url: default_records_base_url(),
            audit_url: default_audit_url(),
            generation_url: default_generation_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

impl HttpConfig {
    /// Reads the API key from the configured environment variable.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("http.records_base_url", &self.records_base_url),
            ("http.audit_url", &self.audit_url),
            ("http.generation_url", &self.generation_url),
            ("http.model", &self.model),
        ] {
            if value.trim().is_empty() {
                return Err(CareflowError::config(format!("{field} must not be empty")));
            }
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CareflowError::config("http.temperature must be within 0.0..=2.0"));
        }
        if self.max_tokens == 0 {
            return Err(CareflowError::config("http.max_tokens must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.generation_timeout(), Duration::from_secs(60));
        assert_eq!(config.default_focus, "general consultation");
        assert_eq!(config.recommended_actions.len(), 2);
        assert_eq!(config.http.max_tokens, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_json_str(
            r#"{"audit_timeout_ms": 100, "http": {"model": "local-model"}}"#,
        )
        .unwrap();
        assert_eq!(config.audit_timeout(), Duration::from_millis(100));
        assert_eq!(config.http.model, "local-model");
        assert_eq!(config.http.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = PipelineConfig::from_json_str(r#"{"lookup_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, CareflowError::Config(_)));
        assert!(err.to_string().contains("lookup_timeout_ms"));
    }

    #[test]
    fn test_empty_disclaimer_rejected() {
        let config = PipelineConfig::new().with_disclaimer("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let err = PipelineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, CareflowError::Serialization(_)));
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::new()
            .with_lookup_timeout(Duration::from_millis(20))
            .with_generation_timeout(Duration::from_millis(30))
            .with_audit_timeout(Duration::from_millis(40))
            .with_default_focus("cardiology");

        assert_eq!(config.lookup_timeout_ms, 20);
        assert_eq!(config.generation_timeout_ms, 30);
        assert_eq!(config.audit_timeout_ms, 40);
        assert_eq!(config.default_focus, "cardiology");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"disclaimer": "Not medical advice."}}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.disclaimer, "Not medical advice.");
    }

    #[test]
    fn test_from_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/careflow.json").unwrap_err();
        assert!(matches!(err, CareflowError::Io(_)));
    }
}
