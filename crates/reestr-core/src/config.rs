use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the
/// process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for
/// testing or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup
/// function, decoupled from the real environment so it can be tested with a
/// plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default =
        |var: &str, default: &str| -> String { lookup(var).unwrap_or_else(|_| default.to_string()) };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        or_default(var, default)
            .parse::<bool>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("REESTR_ENV", "development"));
    let bind_addr = parse_addr("REESTR_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("REESTR_LOG_LEVEL", "info");
    let registry_base_url = or_default(
        "REESTR_REGISTRY_BASE_URL",
        "https://gosreestr.kazpatent.kz/",
    );
    let headless = parse_bool("REESTR_HEADLESS", "true")?;

    let db_max_connections = parse_u32("REESTR_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("REESTR_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("REESTR_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let ui_wait_secs = parse_u64("REESTR_UI_WAIT_SECS", "20")?;
    let detail_timeout_secs = parse_u64("REESTR_DETAIL_TIMEOUT_SECS", "30")?;
    let detail_user_agent = or_default(
        "REESTR_DETAIL_USER_AGENT",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
    );
    let retry_max_attempts = parse_u32("REESTR_RETRY_MAX_ATTEMPTS", "3")?;
    let retry_delay_secs = parse_u64("REESTR_RETRY_DELAY_SECS", "3")?;
    let image_pool_size = parse_usize("REESTR_IMAGE_POOL_SIZE", "10")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        registry_base_url,
        headless,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        ui_wait_secs,
        detail_timeout_secs,
        detail_user_agent,
        retry_max_attempts,
        retry_delay_secs,
        image_pool_size,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Result<String, std::env::VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let map = HashMap::from([("DATABASE_URL", "postgres://localhost/reestr")]);
        let config = build_app_config(lookup_from(&map)).unwrap();

        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.ui_wait_secs, 20);
        assert_eq!(config.detail_timeout_secs, 30);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.image_pool_size, 10);
        assert!(config.headless);
        assert_eq!(
            config.registry_base_url,
            "https://gosreestr.kazpatent.kz/"
        );
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let map = HashMap::new();
        let err = build_app_config(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    fn invalid_numeric_value_is_an_error() {
        let map = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/reestr"),
            ("REESTR_IMAGE_POOL_SIZE", "ten"),
        ]);
        let err = build_app_config(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { var, .. } if var == "REESTR_IMAGE_POOL_SIZE"));
    }

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(parse_environment("production"), Environment::Production);
        assert_eq!(parse_environment("test"), Environment::Test);
        assert_eq!(parse_environment("staging"), Environment::Development);
    }
}
