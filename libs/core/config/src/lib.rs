//! Environment-driven configuration shared by the services.
//!
//! Each config struct implements [`FromEnv`]; apps compose them into their own
//! `Config` and fail fast at startup when something required is missing.

pub mod server;
pub mod tracing;

use std::env;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Name and version of the running binary, reported by `/health`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// Builds an [`AppInfo`] from the calling crate's Cargo metadata.
///
/// ```ignore
/// let app = core_config::app_info!();
/// assert_eq!(app.name, "catalog_api");
/// ```
#[macro_export]
macro_rules! app_info {
    () => {
        $crate::AppInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    };
}

/// Deployment environment, read from `APP_ENV`. Anything other than
/// `production` (any case) is treated as development.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Configuration sections loadable from the process environment.
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Reads `key`, or `default` when unset.
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Reads `key`, failing with [`ConfigError::MissingEnvVar`] when unset.
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parses an environment variable, falling back to `default` when unset.
pub fn env_parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Reads a boolean flag; accepts `true/false`, `1/0`, `yes/no`.
pub fn env_flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::ParseError {
                key: key.to_string(),
                details: format!("expected a boolean, got '{}'", other),
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_app_env() {
        for (value, expected) in [
            (None, Environment::Development),
            (Some("production"), Environment::Production),
            (Some("PRODUCTION"), Environment::Production),
            (Some("staging"), Environment::Development),
        ] {
            temp_env::with_var("APP_ENV", value, || {
                let env = Environment::from_env();
                assert_eq!(env, expected, "APP_ENV={:?}", value);
                assert_eq!(env.is_production(), !env.is_development());
            });
        }
    }

    #[test]
    fn test_env_or_default() {
        temp_env::with_var("DATABASE_URL", Some("postgres://db/catalog"), || {
            assert_eq!(env_or_default("DATABASE_URL", "postgres://localhost"), "postgres://db/catalog");
        });
        temp_env::with_var_unset("DATABASE_URL", || {
            assert_eq!(env_or_default("DATABASE_URL", "postgres://localhost"), "postgres://localhost");
        });
    }

    #[test]
    fn test_env_required() {
        temp_env::with_var("DATABASE_URL", Some("postgres://db/catalog"), || {
            assert_eq!(env_required("DATABASE_URL").unwrap(), "postgres://db/catalog");
        });
        temp_env::with_var_unset("DATABASE_URL", || {
            let err = env_required("DATABASE_URL").unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "DATABASE_URL"));
        });
    }

    #[test]
    fn test_app_info_macro_uses_crate_metadata() {
        let app = app_info!();
        assert_eq!(app.name, "core_config");
        assert_eq!(app.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_env_parse_or() {
        temp_env::with_var_unset("POOL_SIZE", || {
            assert_eq!(env_parse_or("POOL_SIZE", 10u32).unwrap(), 10);
        });
        temp_env::with_var("POOL_SIZE", Some("25"), || {
            assert_eq!(env_parse_or("POOL_SIZE", 10u32).unwrap(), 25);
        });
        temp_env::with_var("POOL_SIZE", Some("many"), || {
            let err = env_parse_or("POOL_SIZE", 10u32).unwrap_err();
            assert!(err.to_string().contains("POOL_SIZE"));
        });
    }

    #[test]
    fn test_env_flag() {
        temp_env::with_var("RUN_MIGRATIONS", Some("YES"), || {
            assert!(env_flag("RUN_MIGRATIONS", false).unwrap());
        });
        temp_env::with_var("RUN_MIGRATIONS", Some("0"), || {
            assert!(!env_flag("RUN_MIGRATIONS", true).unwrap());
        });
        temp_env::with_var_unset("RUN_MIGRATIONS", || {
            assert!(env_flag("RUN_MIGRATIONS", true).unwrap());
        });
        temp_env::with_var("RUN_MIGRATIONS", Some("maybe"), || {
            assert!(env_flag("RUN_MIGRATIONS", true).is_err());
        });
    }
}
