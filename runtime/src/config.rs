use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_DEFAULT_CONTEXT: &str = "TETHER_DEFAULT_CONTEXT";
pub const ENV_TRACE_SCOPES: &str = "TETHER_TRACE_SCOPES";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("default context name must not be empty")]
    EmptyDefaultContext,
    #[error("invalid value `{value}` for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Settings for a [`ContextFactory`](crate::ContextFactory).
///
/// ```toml
/// default_context = "request"
/// trace_scopes = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FactoryConfig {
    /// Name used by `create_default` / `default_context`.
    pub default_context: String,
    /// Open a `Context` span around every scope a provider enters.
    pub trace_scopes: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            default_context: "default".to_string(),
            trace_scopes: true,
        }
    }
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_context(mut self, name: impl Into<String>) -> Self {
        self.default_context = name.into();
        self
    }

    pub fn with_trace_scopes(mut self, enabled: bool) -> Self {
        self.trace_scopes = enabled;
        self
    }

    /// Defaults overridden by `TETHER_DEFAULT_CONTEXT` and `TETHER_TRACE_SCOPES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_DEFAULT_CONTEXT) {
            config.default_context = name;
        }

        if let Some(value) = lookup(ENV_TRACE_SCOPES) {
            config.trace_scopes = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_TRACE_SCOPES,
                        value,
                    });
                }
            };
        }

        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.default_context.trim().is_empty() {
            return Err(ConfigError::EmptyDefaultContext);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FactoryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FactoryConfig::default());
        assert_eq!(config.default_context, "default");
        assert!(config.trace_scopes);
    }

    #[test]
    fn test_env_overrides() {
        let config = FactoryConfig::from_lookup(lookup(&[
            (ENV_DEFAULT_CONTEXT, "request"),
            (ENV_TRACE_SCOPES, "off"),
        ]))
        .unwrap();

        assert_eq!(config.default_context, "request");
        assert!(!config.trace_scopes);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let err = FactoryConfig::from_lookup(lookup(&[(ENV_TRACE_SCOPES, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { value, .. } if value == "maybe"));

        let err = FactoryConfig::from_lookup(lookup(&[(ENV_DEFAULT_CONTEXT, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDefaultContext));
    }

    #[test]
    fn test_toml() {
        let config = FactoryConfig::from_toml_str("default_context = \"tenant\"").unwrap();
        assert_eq!(config.default_context, "tenant");
        assert!(config.trace_scopes);

        assert!(matches!(
            FactoryConfig::from_toml_str("unknown = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, "default_context = \"req\"\ntrace_scopes = false\n").unwrap();

        let config = FactoryConfig::from_file(&path).unwrap();
        assert_eq!(config, FactoryConfig::new().with_default_context("req").with_trace_scopes(false));

        assert!(matches!(
            FactoryConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
