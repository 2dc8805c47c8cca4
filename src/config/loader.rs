//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_BASIC_AUTH_USER: &str = "DECK_GUARD_BASIC_AUTH_USER";
pub const ENV_BASIC_AUTH_PASSWORD: &str = "DECK_GUARD_BASIC_AUTH_PASSWORD";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GuardConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration file loaded");
    Ok(config)
}

/// Credentials may come from the environment instead of the config file.
pub fn apply_env_overrides<F>(config: &mut GuardConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(user) = lookup(ENV_BASIC_AUTH_USER) {
        config.auth.username = Some(user);
    }
    if let Some(password) = lookup(ENV_BASIC_AUTH_PASSWORD) {
        config.auth.password = Some(password);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[workspace]\nroot = \"/srv/project\"\n[rate_limit]\nmax_requests = 7").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.rate_limit.max_requests, 7);
        assert_eq!(config.workspace.root, std::path::PathBuf::from("/srv/project"));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[auth]\ntoken_ttl_secs = 0").unwrap();
        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit\nmax_requests = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GuardConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            ENV_BASIC_AUTH_USER => Some("admin".into()),
            ENV_BASIC_AUTH_PASSWORD => Some("pw".into()),
            _ => None,
        });
        assert_eq!(config.auth.username.as_deref(), Some("admin"));
        assert_eq!(config.auth.password.as_deref(), Some("pw"));
    }
}
