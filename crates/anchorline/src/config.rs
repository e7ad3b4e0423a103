//! Client configuration.
//!
//! Every field has a default; the deployment-specific ones can be
//! overridden from `ANCHORLINE_*` environment variables with
//! [`ClientConfig::from_env`]. The remaining knobs are set in code.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anchorline_notify::ChannelConfig;
use anchorline_session::SessionConfig;
use anchorline_token::DEFAULT_SKEW;
use anchorline_transport::{NearExpiryPolicy, RetryPolicy, TransportConfig};

pub const ENV_BASE_URL: &str = "ANCHORLINE_BASE_URL";
pub const ENV_PUSH_URL: &str = "ANCHORLINE_PUSH_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "ANCHORLINE_REQUEST_TIMEOUT_MS";
pub const ENV_RETRY_ATTEMPTS: &str = "ANCHORLINE_RETRY_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "ANCHORLINE_RETRY_BASE_DELAY_MS";
pub const ENV_STORAGE_DIR: &str = "ANCHORLINE_STORAGE_DIR";

/// Settings for the whole client stack.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined to.
    ///
    /// Default: `http://localhost:8000/api/v1`. Env: `ANCHORLINE_BASE_URL`.
    pub base_url: String,

    /// Push channel endpoint.
    ///
    /// Default: `ws://localhost:8000/ws/notifications`.
    /// Env: `ANCHORLINE_PUSH_URL`.
    pub push_url: String,

    /// Per-attempt request timeout.
    ///
    /// Default: 30 seconds. Env: `ANCHORLINE_REQUEST_TIMEOUT_MS`.
    pub request_timeout: Duration,

    /// Retries after the initial attempt for transient failures.
    ///
    /// Default: 3. Env: `ANCHORLINE_RETRY_ATTEMPTS`.
    pub retry_attempts: u32,

    /// Delay before the first retry; doubles each retry.
    ///
    /// Default: 1 second. Env: `ANCHORLINE_RETRY_BASE_DELAY_MS`.
    pub retry_base_delay: Duration,

    /// Cap on a single retry delay. Default: 30 seconds.
    pub retry_max_delay: Duration,

    /// Wait after a 429 before the error is surfaced. Default: 2 seconds.
    pub rate_limit_cooldown: Duration,

    /// Near-expiry window. Default: 300 seconds.
    pub skew: Duration,

    /// Periodic credential re-check. Default: 5 minutes.
    pub revalidate_interval: Duration,

    /// What a request does with a near-expiry credential.
    pub near_expiry: NearExpiryPolicy,

    /// Push reconnect delay unit. Default: 1 second.
    pub reconnect_base_delay: Duration,

    /// Automatic push reconnects before giving up. Default: 5.
    pub max_reconnect_attempts: u32,

    /// Notifications kept in history. Default: 100.
    pub history_capacity: usize,

    /// Directory for persisted client state. `None` keeps everything in
    /// memory.
    ///
    /// Default: unset. Env: `ANCHORLINE_STORAGE_DIR`.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        let session = SessionConfig::default();
        let channel = ChannelConfig::default();
        Self {
            base_url: transport.base_url,
            push_url: channel.url,
            request_timeout: transport.request_timeout,
            retry_attempts: transport.retry.max_retries,
            retry_base_delay: transport.retry.base_delay,
            retry_max_delay: transport.retry.max_delay,
            rate_limit_cooldown: transport.rate_limit_cooldown,
            skew: DEFAULT_SKEW,
            revalidate_interval: session.revalidate_interval,
            near_expiry: transport.near_expiry,
            reconnect_base_delay: channel.reconnect_base_delay,
            max_reconnect_attempts: channel.max_reconnect_attempts,
            history_capacity: channel.history_capacity,
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by any `ANCHORLINE_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = non_empty(ENV_BASE_URL, url)?;
        }
        if let Some(url) = lookup(ENV_PUSH_URL) {
            config.push_url = non_empty(ENV_PUSH_URL, url)?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms: u64 = parse(ENV_REQUEST_TIMEOUT_MS, &raw)?;
            if ms == 0 {
                return Err(ConfigError::Invalid(ENV_REQUEST_TIMEOUT_MS));
            }
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_RETRY_ATTEMPTS) {
            config.retry_attempts = parse(ENV_RETRY_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_BASE_DELAY_MS) {
            config.retry_base_delay =
                Duration::from_millis(parse(ENV_RETRY_BASE_DELAY_MS, &raw)?);
        }
        if let Some(dir) = lookup(ENV_STORAGE_DIR) {
            config.storage_dir = Some(PathBuf::from(non_empty(ENV_STORAGE_DIR, dir)?));
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            retry: self.retry_policy(),
            rate_limit_cooldown: self.rate_limit_cooldown,
            skew: self.skew,
            near_expiry: self.near_expiry,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            skew: self.skew,
            revalidate_interval: self.revalidate_interval,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.push_url.clone(),
            reconnect_base_delay: self.reconnect_base_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
            history_capacity: self.history_capacity,
            ..ChannelConfig::default()
        }
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid(var))
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(var));
    }
    Ok(value.trim().to_owned())
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_match_layer_defaults() {
        let config = ClientConfig::default();

        assert_eq!(config.base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.push_url, "ws://localhost:8000/ws/notifications");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.skew, Duration::from_secs(300));
        assert_eq!(config.revalidate_interval, Duration::from_secs(300));
        assert_eq!(config.history_capacity, 100);
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn test_from_lookup_without_variables_is_default() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.base_url, ClientConfig::default().base_url);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://api.example.com/v2"),
            (ENV_PUSH_URL, "ws://push.example.com/ws"),
            (ENV_REQUEST_TIMEOUT_MS, "5000"),
            (ENV_RETRY_ATTEMPTS, "0"),
            (ENV_RETRY_BASE_DELAY_MS, "250"),
            (ENV_STORAGE_DIR, "/var/lib/anchorline"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com/v2");
        assert_eq!(config.channel_config().url, "ws://push.example.com/ws");
        assert_eq!(config.transport_config().request_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy().max_retries, 0);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(250));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/var/lib/anchorline")));
    }

    #[test]
    fn test_from_lookup_invalid_number_names_variable() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_RETRY_ATTEMPTS, "three")]))
            .unwrap_err();

        assert_eq!(err, ConfigError::Invalid(ENV_RETRY_ATTEMPTS));
        assert!(err.to_string().contains("ANCHORLINE_RETRY_ATTEMPTS"));
    }

    #[test]
    fn test_from_lookup_zero_timeout_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT_MS, "0")]))
            .unwrap_err();

        assert_eq!(err, ConfigError::Invalid(ENV_REQUEST_TIMEOUT_MS));
    }

    #[test]
    fn test_from_lookup_empty_url_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_BASE_URL, "  ")])).unwrap_err();

        assert_eq!(err, ConfigError::Invalid(ENV_BASE_URL));
    }
}
