use std::{env, fmt, net::SocketAddr, str::FromStr, time::Duration};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://registry.db?mode=rwc";
pub const DEFAULT_EVENTS_ENDPOINT: &str = "http://127.0.0.1:8090/events";
pub const DEFAULT_NOTIFY_MAX_RETRIES: u32 = 3;
pub const DEFAULT_NOTIFY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub events_endpoint: String,
    /// Delivery attempts per notification before it is dropped.
    pub notify_max_retries: u32,
    /// Base delay of the linear notification backoff.
    pub notify_base_delay: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let events_endpoint =
            env::var("EVENTS_ENDPOINT").unwrap_or_else(|_| DEFAULT_EVENTS_ENDPOINT.to_string());

        let notify_max_retries = parse_var("NOTIFY_MAX_RETRIES", DEFAULT_NOTIFY_MAX_RETRIES)?;
        if notify_max_retries == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "NOTIFY_MAX_RETRIES",
                value: "0".to_string(),
            });
        }
        let notify_base_delay = Duration::from_millis(parse_var(
            "NOTIFY_BASE_DELAY_MS",
            DEFAULT_NOTIFY_BASE_DELAY_MS,
        )?);
        let request_timeout = Duration::from_secs(parse_var(
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        let shutdown_timeout = Duration::from_secs(parse_var(
            "SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        )?);

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            events_endpoint,
            notify_max_retries,
            notify_base_delay,
            request_timeout,
            shutdown_timeout,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidNumber { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidNumber { var, value } => {
                write!(f, "{var} must be a positive integer (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
