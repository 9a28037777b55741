//! Configuration loading for the Adnexum CRM service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `ADNEXUM_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "ADNEXUM_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `ADNEXUM_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_tokens: Vec<String>,
    /// Upper bound for a single webhook delivery attempt.
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
    #[serde(default = "default_webhook_max_concurrency")]
    pub webhook_max_concurrency: usize,
    /// Request timeout for the Google and investigation API clients.
    #[serde(default = "default_outbound_timeout_ms")]
    pub outbound_timeout_ms: u64,
    #[serde(default)]
    pub google: GoogleCalendarConfig,
    #[serde(default = "default_investigation_api_base")]
    pub investigation_api_base: String,
    #[serde(default = "default_investigation_poll_interval_ms")]
    pub investigation_poll_interval_ms: u64,
    /// Offset of the user's wall clock from UTC; drives "today" for follow-ups.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

/// Google OAuth and Calendar API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GoogleCalendarConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_google_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_google_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_google_oauth_base")]
    pub oauth_base: String,
    #[serde(default = "default_google_calendar_api_base")]
    pub api_base: String,
    #[serde(default = "default_google_time_zone")]
    pub default_time_zone: String,
    /// Web app origin the OAuth callback sends the browser back to.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,
}

impl Default for GoogleCalendarConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_google_redirect_uri(),
            auth_base: default_google_auth_base(),
            oauth_base: default_google_oauth_base(),
            api_base: default_google_calendar_api_base(),
            default_time_zone: default_google_time_zone(),
            app_origin: default_app_origin(),
        }
    }
}

impl GoogleCalendarConfig {
    /// Whether OAuth client credentials are present.
    pub fn is_configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|v| !v.is_empty())
            && self.client_secret.as_deref().is_some_and(|v| !v.is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            api_tokens: Vec::new(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
            webhook_max_concurrency: default_webhook_max_concurrency(),
            outbound_timeout_ms: default_outbound_timeout_ms(),
            google: GoogleCalendarConfig::default(),
            investigation_api_base: default_investigation_api_base(),
            investigation_poll_interval_ms: default_investigation_poll_interval_ms(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_millis(self.outbound_timeout_ms)
    }

    pub fn investigation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.investigation_poll_interval_ms)
    }

    /// The user's local offset. Falls back to UTC if the stored value is out of range.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.api_tokens.is_empty() {
            config.api_tokens = vec![REDACTED.to_string()];
        }
        if config.google.client_id.is_some() {
            config.google.client_id = Some(REDACTED.to_string());
        }
        if config.google.client_secret.is_some() {
            config.google.client_secret = Some(REDACTED.to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_tokens.is_empty() {
            return Err(ConfigError::MissingApiTokens);
        }

        if self.webhook_timeout_ms == 0 || self.webhook_timeout_ms > 60_000 {
            return Err(ConfigError::InvalidWebhookTimeout {
                value: self.webhook_timeout_ms,
            });
        }

        if self.webhook_max_concurrency == 0 {
            return Err(ConfigError::InvalidWebhookConcurrency);
        }

        if self.outbound_timeout_ms == 0 || self.outbound_timeout_ms > 120_000 {
            return Err(ConfigError::InvalidOutboundTimeout {
                value: self.outbound_timeout_ms,
            });
        }

        if self.investigation_poll_interval_ms < 100 {
            return Err(ConfigError::InvalidPollInterval {
                value: self.investigation_poll_interval_ms,
            });
        }

        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(ConfigError::InvalidUtcOffset {
                value: self.utc_offset_minutes,
            });
        }

        // Google credentials come as a pair.
        if self.google.client_id.is_some() != self.google.client_secret.is_some() {
            return Err(ConfigError::IncompleteGoogleCredentials);
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://adnexum.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_max_concurrency() -> usize {
    8
}

fn default_outbound_timeout_ms() -> u64 {
    15_000
}

fn default_google_redirect_uri() -> String {
    "http://localhost:3000/api/google-calendar/callback".to_string()
}

fn default_google_auth_base() -> String {
    "https://accounts.google.com".to_string()
}

fn default_google_oauth_base() -> String {
    "https://oauth2.googleapis.com".to_string()
}

fn default_google_calendar_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_google_time_zone() -> String {
    "America/Argentina/Buenos_Aires".to_string()
}

fn default_app_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_investigation_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_investigation_poll_interval_ms() -> u64 {
    2000
}

fn default_utc_offset_minutes() -> i32 {
    -180 // Buenos Aires
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("no api tokens configured; set ADNEXUM_API_TOKEN or ADNEXUM_API_TOKENS")]
    MissingApiTokens,
    #[error("webhook timeout must be between 1 and 60000 ms, got {value}")]
    InvalidWebhookTimeout { value: u64 },
    #[error("webhook max concurrency must be at least 1")]
    InvalidWebhookConcurrency,
    #[error("outbound timeout must be between 1 and 120000 ms, got {value}")]
    InvalidOutboundTimeout { value: u64 },
    #[error("investigation poll interval must be at least 100 ms, got {value}")]
    InvalidPollInterval { value: u64 },
    #[error("utc offset must be within +/- 840 minutes, got {value}")]
    InvalidUtcOffset { value: i32 },
    #[error("google client id and secret must be configured together")]
    IncompleteGoogleCredentials,
}

/// Loads configuration using layered `.env` files and `ADNEXUM_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, validates and returns the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let config = Self::from_layered(layered, profile_hint);
        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn from_layered(mut layered: BTreeMap<String, String>, profile_hint: String) -> AppConfig {
        let mut take = |key: &str| {
            layered
                .remove(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url = take("DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        // Support both a single token and a comma-separated list
        let api_tokens = if let Some(tokens) = take("API_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = take("API_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let webhook_timeout_ms = take("WEBHOOK_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_webhook_timeout_ms);
        let webhook_max_concurrency = take("WEBHOOK_MAX_CONCURRENCY")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_webhook_max_concurrency);
        let outbound_timeout_ms = take("OUTBOUND_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_outbound_timeout_ms);

        let google = GoogleCalendarConfig {
            client_id: take("GOOGLE_CLIENT_ID"),
            client_secret: take("GOOGLE_CLIENT_SECRET"),
            redirect_uri: take("GOOGLE_REDIRECT_URI").unwrap_or_else(default_google_redirect_uri),
            auth_base: take("GOOGLE_AUTH_BASE").unwrap_or_else(default_google_auth_base),
            oauth_base: take("GOOGLE_OAUTH_BASE").unwrap_or_else(default_google_oauth_base),
            api_base: take("GOOGLE_CALENDAR_API_BASE")
                .unwrap_or_else(default_google_calendar_api_base),
            default_time_zone: take("GOOGLE_DEFAULT_TIME_ZONE")
                .unwrap_or_else(default_google_time_zone),
            app_origin: take("APP_ORIGIN").unwrap_or_else(default_app_origin),
        };

        let investigation_api_base =
            take("INVESTIGATION_API_BASE").unwrap_or_else(default_investigation_api_base);
        let investigation_poll_interval_ms = take("INVESTIGATION_POLL_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_investigation_poll_interval_ms);
        let utc_offset_minutes = take("UTC_OFFSET_MINUTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_utc_offset_minutes);

        AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            api_tokens,
            webhook_timeout_ms,
            webhook_max_concurrency,
            outbound_timeout_ms,
            google,
            investigation_api_base,
            investigation_poll_interval_ms,
            utc_offset_minutes,
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("ADNEXUM_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_applied_for_missing_keys() {
        let config = ConfigLoader::from_layered(BTreeMap::new(), "local".into());
        assert_eq!(config.webhook_timeout_ms, 10_000);
        assert_eq!(config.investigation_poll_interval_ms, 2000);
        assert_eq!(config.outbound_timeout(), Duration::from_secs(15));
        assert_eq!(
            config.google.default_time_zone,
            "America/Argentina/Buenos_Aires"
        );
        assert!(config.api_tokens.is_empty());
    }

    #[test]
    fn token_list_takes_precedence_over_single_token() {
        let config = ConfigLoader::from_layered(
            layered(&[("API_TOKENS", "a, b,,c"), ("API_TOKEN", "single")]),
            "local".into(),
        );
        assert_eq!(config.api_tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn validation_requires_tokens() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingApiTokens)
        ));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = AppConfig {
            api_tokens: vec!["t".into()],
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());

        config.webhook_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWebhookTimeout { value: 0 })
        ));

        config.webhook_timeout_ms = 5000;
        config.outbound_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOutboundTimeout { value: 0 })
        ));

        config.outbound_timeout_ms = 15_000;
        config.utc_offset_minutes = 15 * 60;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUtcOffset { .. })
        ));

        config.utc_offset_minutes = 0;
        config.google.client_id = Some("id".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompleteGoogleCredentials)
        ));
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let mut config = AppConfig {
            api_tokens: vec!["super-secret".into()],
            ..AppConfig::default()
        };
        config.google.client_secret = Some("shh".into());
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("shh"));
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn local_offset_uses_configured_minutes() {
        let config = AppConfig::default();
        assert_eq!(config.local_offset().local_minus_utc(), -180 * 60);
    }
}
