//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows, limits, TTLs > 0)
//! - Reject half-configured credentials
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GuardConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("auth.username and auth.password must be set together")]
    PartialCredentials,
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let rl = &config.rate_limit;
    let checks: [(&'static str, bool); 8] = [
        ("timeouts.request_secs", config.timeouts.request_secs == 0),
        ("rate_limit.window_ms", rl.window_ms == 0),
        ("rate_limit.max_requests", rl.max_requests == 0),
        ("rate_limit.max_entries", rl.max_entries == 0),
        ("rate_limit.sweep_interval_secs", rl.sweep_interval_secs == 0),
        ("auth.token_ttl_secs", config.auth.token_ttl_secs == 0),
        ("auth.sweep_interval_secs", config.auth.sweep_interval_secs == 0),
        ("auth.max_tokens", config.auth.max_tokens == 0),
    ];
    errors.extend(
        checks
            .into_iter()
            .filter(|(_, zero)| *zero)
            .map(|(field, _)| ValidationError::Zero { field }),
    );

    let has_user = config.auth.username.as_deref().is_some_and(|u| !u.is_empty());
    let has_pass = config.auth.password.as_deref().is_some_and(|p| !p.is_empty());
    if has_user != has_pass {
        errors.push(ValidationError::PartialCredentials);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GuardConfig::default();
        config.listener.bind_address = "nope".into();
        config.rate_limit.window_ms = 0;
        config.rate_limit.max_requests = 0;
        config.auth.password = Some("pw".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::PartialCredentials));
        assert!(errors.contains(&ValidationError::Zero { field: "rate_limit.window_ms" }));
    }

    #[test]
    fn test_zero_token_capacity_rejected() {
        let mut config = GuardConfig::default();
        config.auth.max_tokens = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::Zero { field: "auth.max_tokens" }]);
    }
}
