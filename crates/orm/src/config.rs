//! Runtime configuration for compiled models and storage connections.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ModelError;

/// Configuration errors raised while loading or validating `OrmConfig`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

/// Behavior knobs shared by every model compiled into a registry
#[derive(Debug, Clone, PartialEq)]
pub struct OrmConfig {
    /// `paginate` limit when the caller does not pass one
    pub default_page_size: usize,
    /// Cap applied by `hasMany` accessors without an explicit page size
    pub relation_page_size: usize,
    /// Lifecycle events are only dispatched when this is set
    pub dispatch_events: bool,
    /// Run attribute validation rules on `create` / `update` / `save`
    pub validate_on_write: bool,
    pub database_url: Option<String>,
}

impl OrmConfig {
    pub fn new() -> Self {
        Self {
            default_page_size: 10,
            relation_page_size: 10,
            dispatch_events: true,
            validate_on_write: true,
            database_url: None,
        }
    }

    /// Load configuration from `FORGE_*` and `DATABASE_URL` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(size) = parse_env::<usize>("FORGE_DEFAULT_PAGE_SIZE", "positive integer")? {
            config.default_page_size = size;
        }

        if let Some(size) = parse_env::<usize>("FORGE_RELATION_PAGE_SIZE", "positive integer")? {
            config.relation_page_size = size;
        }

        if let Some(flag) = parse_env::<bool>("FORGE_DISPATCH_EVENTS", "true or false")? {
            config.dispatch_events = flag;
        }

        if let Some(flag) = parse_env::<bool>("FORGE_VALIDATE_ON_WRITE", "true or false")? {
            config.validate_on_write = flag;
        }

        config.database_url = env::var("DATABASE_URL").ok();

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "default_page_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.relation_page_size == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "relation_page_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some(database_url) = &self.database_url {
            let parsed = url::Url::parse(database_url).map_err(|e| ConfigError::InvalidValue {
                field: "database_url".to_string(),
                value: database_url.clone(),
                expected: format!("valid connection URL ({})", e),
            })?;

            if !matches!(parsed.scheme(), "postgres" | "postgresql") {
                return Err(ConfigError::InvalidValue {
                    field: "database_url".to_string(),
                    value: database_url.clone(),
                    expected: "postgres:// or postgresql:// scheme".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn has_database(&self) -> bool {
        self.database_url.is_some()
    }
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: FromStr>(var: &str, expected: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: var.to_string(),
                value: raw,
                expected: expected.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Connection pool configuration for the Postgres storage adapter
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_before_acquire: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "FORGE_DEFAULT_PAGE_SIZE",
            "FORGE_RELATION_PAGE_SIZE",
            "FORGE_DISPATCH_EVENTS",
            "FORGE_VALIDATE_ON_WRITE",
            "DATABASE_URL",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = OrmConfig::from_env().unwrap();
        assert_eq!(config, OrmConfig::default());
        assert_eq!(config.default_page_size, 10);
        assert!(!config.has_database());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("FORGE_DEFAULT_PAGE_SIZE", "25");
        env::set_var("FORGE_DISPATCH_EVENTS", "false");
        env::set_var("DATABASE_URL", "postgres://localhost/forge_test");

        let config = OrmConfig::from_env().unwrap();
        assert_eq!(config.default_page_size, 25);
        assert!(!config.dispatch_events);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/forge_test")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();
        env::set_var("FORGE_DEFAULT_PAGE_SIZE", "ten");
        assert!(matches!(
            OrmConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        env::set_var("FORGE_DEFAULT_PAGE_SIZE", "0");
        assert!(matches!(
            OrmConfig::from_env(),
            Err(ConfigError::ValidationFailed { .. })
        ));
        clear_env();

        env::set_var("DATABASE_URL", "mysql://localhost/db");
        let err = OrmConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("postgres"));
        clear_env();
    }
}
