//! Configuration types for openapi-lint.

use crate::rule::OpenApiType;
use crate::types::Severity;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration for openapi-lint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Analyzer configuration.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Per-rule configurations.
    #[serde(default)]
    pub rules: HashMap<String, RuleConfig>,
}

impl Config {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Checks if a rule is enabled.
    #[must_use]
    pub fn is_rule_enabled(&self, rule_name: &str) -> bool {
        self.rules
            .get(rule_name)
            .map_or(true, |c| c.enabled.unwrap_or(true))
    }

    /// Gets the severity override for a rule.
    #[must_use]
    pub fn rule_severity(&self, rule_name: &str) -> Option<Severity> {
        self.rules.get(rule_name).and_then(|c| c.severity)
    }

    /// Gets the option overrides for a rule as JSON (`null` when none).
    #[must_use]
    pub fn rule_options(&self, rule_name: &str) -> serde_json::Value {
        self.rules
            .get(rule_name)
            .map_or(serde_json::Value::Null, RuleConfig::options_json)
    }
}

/// Analyzer-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Kind of description being linted (default: `default`).
    #[serde(default)]
    pub openapi_type: OpenApiType,

    /// Maximum number of documents processed in parallel.
    #[serde(default)]
    pub parallelism: Option<usize>,

    /// Lowest severity that fails the run (default: error).
    #[serde(default)]
    pub fail_on: Option<Severity>,
}

impl AnalyzerConfig {
    /// Worker count: the configured value, else the available parallelism.
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism
            .filter(|n| *n > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
    }

    /// Failure threshold, defaulting to errors.
    #[must_use]
    pub fn fail_on(&self) -> Severity {
        self.fail_on.unwrap_or(Severity::Error)
    }
}

/// Per-rule configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Whether this rule is enabled.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Severity override for this rule.
    #[serde(default)]
    pub severity: Option<Severity>,

    /// Rule-specific options as key-value pairs.
    #[serde(flatten)]
    pub options: HashMap<String, toml::Value>,
}

impl RuleConfig {
    /// Options converted to a JSON object, as rule functions receive them.
    #[must_use]
    pub fn options_json(&self) -> serde_json::Value {
        if self.options.is_empty() {
            return serde_json::Value::Null;
        }
        let mut keys: Vec<_> = self.options.keys().collect();
        keys.sort();
        let members = keys
            .into_iter()
            .filter_map(|key| {
                let value = serde_json::to_value(&self.options[key]).ok()?;
                Some((key.clone(), value))
            })
            .collect();
        serde_json::Value::Object(members)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Parse error in config file.
    #[error("Failed to parse config: {message}")]
    Parse {
        /// Parse error message.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.analyzer.openapi_type, OpenApiType::Default);
        assert_eq!(config.analyzer.fail_on(), Severity::Error);
        assert!(config.analyzer.effective_parallelism() >= 1);
        assert!(config.rules.is_empty());
        assert!(config.is_rule_enabled("Anything"));
    }

    #[test]
    fn parse_config() {
        let toml = r#"
[analyzer]
openapi_type = "data-plane"
parallelism = 2
fail_on = "warning"

[rules.PageableOperation]
enabled = false

[rules.PatchBodyParametersSchema]
severity = "warning"
max_depth = 4
names = ["a", "b"]
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.analyzer.openapi_type, OpenApiType::DataPlane);
        assert_eq!(config.analyzer.effective_parallelism(), 2);
        assert_eq!(config.analyzer.fail_on(), Severity::Warning);
        assert!(!config.is_rule_enabled("PageableOperation"));
        assert_eq!(
            config.rule_severity("PatchBodyParametersSchema"),
            Some(Severity::Warning)
        );
        assert_eq!(
            config.rule_options("PatchBodyParametersSchema"),
            json!({"max_depth": 4, "names": ["a", "b"]})
        );
        assert_eq!(config.rule_options("PageableOperation"), serde_json::Value::Null);

        let rule = &config.rules["PatchBodyParametersSchema"];
        assert_eq!(rule.options_json()["max_depth"], 4);
    }

    #[test]
    fn rejects_unknown_openapi_type() {
        let err = Config::parse("[analyzer]\nopenapi_type = \"grpc\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
