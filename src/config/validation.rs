//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the deployment contract is satisfied (secret present,
//!   database credentials complete when the layer is enabled)
//! - Validate value ranges (capacities > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, both at startup
//!   and on hot reload

use std::net::SocketAddr;

use crate::config::schema::RelayConfig;

/// Minimum length for the relay secret and the admin API key.
/// Shorter values are almost certainly placeholders.
const MIN_SECRET_LEN: usize = 16;

/// A single validation failure, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every failure.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a valid socket address: {}", config.listener.bind_address),
        ));
    }

    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be at least 1",
        ));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    if config.auth.secret.is_empty() {
        errors.push(ValidationError::new(
            "auth.secret",
            "missing; set SSE_SECRET in the environment or auth.secret in the config file",
        ));
    } else if config.auth.secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.secret",
            format!("must be at least {} characters", MIN_SECRET_LEN),
        ));
    }

    if config.auth.max_topics_per_token == 0 {
        errors.push(ValidationError::new("auth.max_topics_per_token", "must be at least 1"));
    }

    if config.database.enabled && config.database.url.is_none() {
        if config.database.name.is_empty() {
            errors.push(ValidationError::new(
                "database.name",
                "missing; set PG_DATABASE in the environment",
            ));
        }
        if config.database.user.is_empty() {
            errors.push(ValidationError::new(
                "database.user",
                "missing; set PG_USER in the environment",
            ));
        }
        if config.database.password.is_empty() {
            errors.push(ValidationError::new(
                "database.password",
                "missing; set PG_PASSWORD in the environment",
            ));
        }
    }

    if config.database.enabled {
        if config.database.max_connections == 0 {
            errors.push(ValidationError::new("database.max_connections", "must be at least 1"));
        }
        if config.database.connect_attempts == 0 {
            errors.push(ValidationError::new("database.connect_attempts", "must be at least 1"));
        }
        if config.database.unhealthy_threshold == 0 || config.database.healthy_threshold == 0 {
            errors.push(ValidationError::new(
                "database.unhealthy_threshold",
                "health thresholds must be at least 1",
            ));
        }
    }

    if config.stream.channel_capacity == 0 {
        errors.push(ValidationError::new("stream.channel_capacity", "must be at least 1"));
    }
    if config.stream.keepalive_secs == 0 {
        errors.push(ValidationError::new("stream.keepalive_secs", "must be at least 1"));
    }
    if config.stream.max_clients == 0 {
        errors.push(ValidationError::new("stream.max_clients", "must be at least 1"));
    }
    if config.stream.max_payload_bytes == 0 {
        errors.push(ValidationError::new("stream.max_payload_bytes", "must be at least 1"));
    }

    if config.moderation.refresh_secs == 0 {
        errors.push(ValidationError::new("moderation.refresh_secs", "must be at least 1"));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new(
                "admin.api_key",
                "missing; set RELAY_ADMIN_KEY or admin.api_key when admin is enabled",
            ));
        } else if config.admin.api_key.len() < MIN_SECRET_LEN {
            errors.push(ValidationError::new(
                "admin.api_key",
                format!("must be at least {} characters", MIN_SECRET_LEN),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "not a valid socket address: {}",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
