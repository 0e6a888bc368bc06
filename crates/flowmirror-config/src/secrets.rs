//! API key resolution.
//!
//! Resolution order:
//! 1. Environment variable (`FLOWMIRROR_API_KEY`)
//! 2. Config file (with warning at load time)

/// Environment variable holding the upstream API key.
pub const API_KEY_ENV: &str = "FLOWMIRROR_API_KEY";

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the upstream API key from the environment, then the config value.
pub fn resolve_api_key(config_value: Option<&str>) -> Option<ResolvedSecret> {
    resolve_with(std::env::var(API_KEY_ENV).ok(), config_value)
}

fn resolve_with(env_value: Option<String>, config_value: Option<&str>) -> Option<ResolvedSecret> {
    if let Some(value) = env_value
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(API_KEY_ENV.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_wins_over_config() {
        let resolved = resolve_with(Some("from-env".into()), Some("from-file")).unwrap();
        assert_eq!(resolved.value, "from-env");
        assert_eq!(resolved.source, SecretSource::EnvVar(API_KEY_ENV.to_string()));
    }

    #[test]
    fn test_config_fallback() {
        let resolved = resolve_with(None, Some("from-file")).unwrap();
        assert_eq!(resolved.source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_empty_values_ignored() {
        assert!(resolve_with(Some(String::new()), Some("")).is_none());
    }
}
