//! Configuration loading from disk and the environment.
//!
//! Loading is a three step pipeline: read and parse the TOML file,
//! overlay deployment environment variables, then validate. The file
//! is optional; a deployment that sets `SSE_SECRET` and the `PG_*`
//! variables and takes every other default needs no file at all.

use std::fs;
use std::path::Path;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file plus the
/// process environment.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&content).map_err(ConfigError::Parse)?
    } else {
        RelayConfig::default()
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay deployment environment variables onto a parsed config.
///
/// The variable names are the deployment contract: `SSE_SECRET` for the
/// relay secret and `PG_DATABASE` / `PG_USER` / `PG_PASSWORD` for the
/// database. Environment values always win over file values. The lookup
/// is injected so tests can run without touching process state.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup("SSE_SECRET") {
        config.auth.secret = secret;
    }
    if let Some(name) = lookup("PG_DATABASE") {
        config.database.name = name;
        config.database.enabled = true;
    }
    if let Some(user) = lookup("PG_USER") {
        config.database.user = user;
    }
    if let Some(password) = lookup("PG_PASSWORD") {
        config.database.password = password;
    }
    if let Some(host) = lookup("PG_HOST") {
        config.database.host = host;
    }
    if let Some(port) = lookup("PG_PORT") {
        if let Ok(port) = port.parse() {
            config.database.port = port;
        }
    }
    if let Some(bind) = lookup("RELAY_BIND") {
        config.listener.bind_address = bind;
    }
    if let Some(key) = lookup("RELAY_ADMIN_KEY") {
        config.admin.api_key = key;
        config.admin.enabled = true;
    }
}
