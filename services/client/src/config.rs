use questionnaire_core::config::DEFAULT_PERMANENT_CLOSE_CODES;
use questionnaire_core::{EndpointError, EndpointTemplate, SessionConfig};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub use_tls: bool,
    pub endpoint_template: EndpointTemplate,
    pub max_reconnect_attempts: u32,
    pub reconnect_base: Duration,
    pub reconnect_ceiling: Duration,
    pub permanent_close_codes: Vec<u16>,
    pub choice_answers: bool,
    pub log_level: Level,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", other),
            )),
        },
        Err(_) => Ok(default),
    }
}

fn parse_close_codes(raw: &str) -> Result<Vec<u16>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue(
                    "CHAT_PERMANENT_CLOSE_CODES".to_string(),
                    format!("'{}' is not a close code", s),
                )
            })
        })
        .collect()
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let host = std::env::var("CHAT_HOST")
            .map_err(|_| ConfigError::MissingVar("CHAT_HOST".to_string()))?;
        let use_tls = parse_flag("CHAT_USE_TLS", false)?;

        let endpoint_template = match std::env::var("CHAT_ENDPOINT_TEMPLATE") {
            Ok(raw) => EndpointTemplate::new(raw).map_err(|e| {
                ConfigError::InvalidValue("CHAT_ENDPOINT_TEMPLATE".to_string(), e.to_string())
            })?,
            Err(_) => EndpointTemplate::default(),
        };

        let max_reconnect_attempts = parse_var("CHAT_MAX_RECONNECT_ATTEMPTS", 3u32)?;
        let reconnect_base = Duration::from_millis(parse_var("CHAT_RECONNECT_BASE_MS", 2000u64)?);
        let reconnect_ceiling =
            Duration::from_millis(parse_var("CHAT_RECONNECT_CEILING_MS", 8000u64)?);
        if reconnect_ceiling < reconnect_base {
            return Err(ConfigError::InvalidValue(
                "CHAT_RECONNECT_CEILING_MS".to_string(),
                "ceiling must not be lower than CHAT_RECONNECT_BASE_MS".to_string(),
            ));
        }

        let permanent_close_codes = match std::env::var("CHAT_PERMANENT_CLOSE_CODES") {
            Ok(raw) => parse_close_codes(&raw)?,
            Err(_) => DEFAULT_PERMANENT_CLOSE_CODES.to_vec(),
        };

        let choice_answers = parse_flag("CHAT_CHOICE_ANSWERS", true)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            host,
            use_tls,
            endpoint_template,
            max_reconnect_attempts,
            reconnect_base,
            reconnect_ceiling,
            permanent_close_codes,
            choice_answers,
            log_level,
        })
    }

    /// The core session configuration described by this environment.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_endpoint_template(self.endpoint_template.clone())
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
            .with_backoff(self.reconnect_base, self.reconnect_ceiling)
            .with_permanent_close_codes(self.permanent_close_codes.iter().copied())
            .with_choice_answers(self.choice_answers)
    }

    /// Renders the websocket endpoint for one conversation.
    pub fn endpoint_for(&self, session_id: &str) -> Result<String, EndpointError> {
        self.endpoint_template
            .render(&self.host, self.use_tls, session_id)
    }
}
