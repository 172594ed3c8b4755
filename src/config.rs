use std::env;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_CHAT_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Upper bound for every duration setting, about 100 years.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub broker_api_url: Option<String>,
    pub broker_api_key: String,
    pub broker_token_secret: Option<String>,
    pub relay_timeout: Duration,
    pub chat_retention: Duration,
    pub location_ttl: Duration,
    pub location_sweep_interval: Duration,
    pub ws_write_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            database_url: non_empty(&lookup, "DATABASE_URL"),
            jwt_secret: non_empty(&lookup, "JWT_SECRET"),
            broker_api_url: non_empty(&lookup, "CENTRIFUGO_API_URL"),
            broker_api_key: lookup("CENTRIFUGO_API_KEY").unwrap_or_default(),
            broker_token_secret: non_empty(&lookup, "CENTRIFUGO_SECRET"),
            relay_timeout: secs(&lookup, "RELAY_TIMEOUT_SECS", 10)?,
            chat_retention: secs(&lookup, "CHAT_RETENTION_SECS", DEFAULT_CHAT_RETENTION_SECS)?,
            location_ttl: secs(&lookup, "LOCATION_TTL_SECS", 900)?,
            location_sweep_interval: secs(&lookup, "LOCATION_SWEEP_SECS", 60)?,
            ws_write_timeout: secs(&lookup, "WS_WRITE_TIMEOUT_SECS", 10)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            jwt_secret: None,
            broker_api_url: None,
            broker_api_key: String::new(),
            broker_token_secret: None,
            relay_timeout: Duration::from_secs(10),
            chat_retention: Duration::from_secs(DEFAULT_CHAT_RETENTION_SECS),
            location_ttl: Duration::from_secs(900),
            location_sweep_interval: Duration::from_secs(60),
            ws_write_timeout: Duration::from_secs(10),
        }
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Configuration(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: u64 = parse_or_default(lookup, key, default)?;
    if value == 0 || value > MAX_DURATION_SECS {
        return Err(AppError::Configuration(format!(
            "{key} must be between 1 and {MAX_DURATION_SECS} seconds, got {value}"
        )));
    }
    Ok(Duration::from_secs(value))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::Config;
    use crate::error::AppError;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.http_port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.chat_retention, Duration::from_secs(86_400));
        assert!(config.broker_token_secret.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = Config::from_lookup(lookup_from(&[
            ("HTTP_PORT", "8080"),
            ("CENTRIFUGO_API_URL", "http://localhost:8000/api/publish"),
            ("CENTRIFUGO_SECRET", "s3cret"),
            ("CHAT_RETENTION_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(
            config.broker_api_url.as_deref(),
            Some("http://localhost:8000/api/publish")
        );
        assert_eq!(config.broker_token_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.chat_retention, Duration::from_secs(30));
    }

    #[test]
    fn blank_secret_counts_as_unset() {
        let config = Config::from_lookup(lookup_from(&[("CENTRIFUGO_SECRET", "  ")])).unwrap();
        assert!(config.broker_token_secret.is_none());
    }

    #[test]
    fn durations_must_be_positive_and_bounded() {
        for (key, value) in [
            ("LOCATION_SWEEP_SECS", "0"),
            ("WS_WRITE_TIMEOUT_SECS", "0"),
            ("CHAT_RETENTION_SECS", "9000000000000"),
            ("RELAY_TIMEOUT_SECS", "0"),
        ] {
            let result = Config::from_lookup(lookup_from(&[(key, value)]));
            assert!(
                matches!(result, Err(AppError::Configuration(_))),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn malformed_number_is_a_configuration_error() {
        let result = Config::from_lookup(lookup_from(&[("HTTP_PORT", "eighty")]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
