use crate::error::{AppError, Result};
use resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub channels: ChannelConfig,
    pub reconnect: ReconnectConfig,
    pub toast: ToastConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub admin_url: String,
    pub notifications_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastConfig {
    pub max_toasts: usize,
    pub default_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Poll interval for sessions without the personalized channel, 0 disables polling
    pub match_poll_interval_secs: u64,
    pub event_bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig {
                base_url: "http://localhost:8080".to_string(),
                request_timeout_ms: 10_000,
            },
            channels: ChannelConfig {
                admin_url: "ws://localhost:8080/ws/admin".to_string(),
                notifications_url: "ws://localhost:8080/ws/notifications".to_string(),
            },
            reconnect: ReconnectConfig {
                max_attempts: 5,
                initial_backoff_ms: 1_000,
                max_backoff_ms: 30_000,
                jitter: true,
            },
            toast: ToastConfig {
                max_toasts: crate::services::toast_queue::MAX_TOASTS,
                default_duration_ms: 5_000,
            },
            session: SessionConfig {
                match_poll_interval_secs: 60,
                event_bus_capacity: 64,
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env` when present)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Ok(Config {
            api: ApiConfig {
                base_url: env_string("API_BASE_URL", &defaults.api.base_url),
                request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", defaults.api.request_timeout_ms)?,
            },
            channels: ChannelConfig {
                admin_url: env_string("ADMIN_CHANNEL_URL", &defaults.channels.admin_url),
                notifications_url: env_string(
                    "NOTIFICATION_CHANNEL_URL",
                    &defaults.channels.notifications_url,
                ),
            },
            reconnect: ReconnectConfig {
                max_attempts: env_parse("RECONNECT_MAX_ATTEMPTS", defaults.reconnect.max_attempts)?,
                initial_backoff_ms: env_parse(
                    "RECONNECT_INITIAL_BACKOFF_MS",
                    defaults.reconnect.initial_backoff_ms,
                )?,
                max_backoff_ms: env_parse(
                    "RECONNECT_MAX_BACKOFF_MS",
                    defaults.reconnect.max_backoff_ms,
                )?,
                jitter: env_parse("RECONNECT_JITTER", defaults.reconnect.jitter)?,
            },
            toast: ToastConfig {
                max_toasts: env_parse("TOAST_MAX", defaults.toast.max_toasts)?,
                default_duration_ms: env_parse(
                    "TOAST_DEFAULT_DURATION_MS",
                    defaults.toast.default_duration_ms,
                )?,
            },
            session: SessionConfig {
                match_poll_interval_secs: env_parse(
                    "MATCH_POLL_INTERVAL_SECS",
                    defaults.session.match_poll_interval_secs,
                )?,
                event_bus_capacity: env_parse(
                    "EVENT_BUS_CAPACITY",
                    defaults.session.event_bus_capacity,
                )?,
            },
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms)
    }

    pub fn match_poll_interval(&self) -> Option<Duration> {
        match self.session.match_poll_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl ReconnectConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: 2.0,
            jitter: self.jitter,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}
