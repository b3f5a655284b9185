use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, prelude::*};

/// Install color-eyre with the project configuration.
///
/// Call this first in `main()`, before anything fallible. Shows the
/// location of each error and hides the environment section.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Output format of the fmt layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// One flattened JSON object per event, for log aggregation
    Json,
    /// Multi-line human-readable output
    Pretty,
}

impl LogFormat {
    /// `LOG_FORMAT=json|pretty`, otherwise JSON in production and pretty elsewhere.
    pub fn from_env(environment: &Environment) -> Self {
        match std::env::var("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            Ok(v) if v == "json" => LogFormat::Json,
            Ok(v) if v == "pretty" => LogFormat::Pretty,
            _ if environment.is_production() => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Default `EnvFilter` directives when `RUST_LOG` is unset.
pub fn default_directives(environment: &Environment) -> &'static str {
    if environment.is_production() {
        "info,tower_http=info,sqlx=warn,sea_orm=warn"
    } else {
        "debug,tower_http=debug,sqlx=info,hyper=info"
    }
}

/// Initialize the global subscriber.
///
/// Layers: `EnvFilter` (`RUST_LOG`, else [`default_directives`]), a fmt layer
/// in the [`LogFormat`] chosen for the environment, and
/// `tracing_error::ErrorLayer` so `color-eyre` reports carry span traces.
///
/// Later calls are no-ops, which keeps tests that initialise tracing
/// independently from fighting over the global default.
///
/// ```ignore
/// #[instrument(skip(self))]
/// pub async fn move_category(&self, id: i64, input: MoveCategory) -> CategoryResult<Category> {
///     // every event logged in here carries `id`
/// }
/// ```
pub fn init_tracing(environment: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(environment)));
    let format = LogFormat::from_env(environment);

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .try_init(),
    };

    match result {
        Ok(_) => info!(environment = ?environment, format = ?format, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized, skipping re-initialization"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_follows_environment() {
        temp_env::with_var_unset("LOG_FORMAT", || {
            assert_eq!(LogFormat::from_env(&Environment::Production), LogFormat::Json);
            assert_eq!(LogFormat::from_env(&Environment::Development), LogFormat::Pretty);
        });
    }

    #[test]
    fn test_log_format_override() {
        temp_env::with_var("LOG_FORMAT", Some("JSON"), || {
            assert_eq!(LogFormat::from_env(&Environment::Development), LogFormat::Json);
        });
        temp_env::with_var("LOG_FORMAT", Some("pretty"), || {
            assert_eq!(LogFormat::from_env(&Environment::Production), LogFormat::Pretty);
        });
        temp_env::with_var("LOG_FORMAT", Some("xml"), || {
            assert_eq!(LogFormat::from_env(&Environment::Production), LogFormat::Json);
        });
    }

    #[test]
    fn test_production_quiets_sql_logging() {
        assert!(default_directives(&Environment::Production).contains("sqlx=warn"));
        assert!(default_directives(&Environment::Development).starts_with("debug"));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            init_tracing(&Environment::Development);
            init_tracing(&Environment::Production);
        });
    }
}
