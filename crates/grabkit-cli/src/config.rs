//! Service configuration from the environment

use grabkit::{FetchError, MediaPolicy, Tool};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const ENV_BIND_ADDR: &str = "GRABKIT_BIND_ADDR";
pub const ENV_USER_AGENT: &str = "GRABKIT_USER_AGENT";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "GRABKIT_FETCH_TIMEOUT_SECS";
pub const ENV_STREAM_TIMEOUT_SECS: &str = "GRABKIT_STREAM_TIMEOUT_SECS";
/// Comma separated, replaces the default extension list
pub const ENV_MEDIA_EXTENSIONS: &str = "GRABKIT_MEDIA_EXTENSIONS";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

/// HTTP service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    bind_addr: String,
    user_agent: Option<String>,
    fetch_timeout: Duration,
    stream_timeout: Duration,
    media_extensions: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            user_agent: None,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            stream_timeout: Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS),
            media_extensions: None,
        }
    }
}

impl ServerConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            config = config.with_bind_addr(addr)?;
        }
        if let Some(ua) = lookup(ENV_USER_AGENT).filter(|ua| !ua.trim().is_empty()) {
            config.user_agent = Some(ua);
        }
        if let Some(value) = lookup(ENV_FETCH_TIMEOUT_SECS) {
            config.fetch_timeout = parse_seconds(ENV_FETCH_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_STREAM_TIMEOUT_SECS) {
            config.stream_timeout = parse_seconds(ENV_STREAM_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MEDIA_EXTENSIONS) {
            let extensions: Vec<String> = value
                .split(',')
                .map(|ext| ext.trim().to_string())
                .filter(|ext| !ext.is_empty())
                .collect();
            if extensions.is_empty() {
                return Err(ConfigError::Empty {
                    name: ENV_MEDIA_EXTENSIONS,
                });
            }
            config.media_extensions = Some(extensions);
        }

        Ok(config)
    }

    /// Override the bind address
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Result<Self, ConfigError> {
        let addr = addr.into().trim().to_string();
        if addr.is_empty() {
            return Err(ConfigError::Empty {
                name: ENV_BIND_ADDR,
            });
        }
        self.bind_addr = addr;
        Ok(self)
    }

    /// Override the user agent
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// TCP bind address (host:port)
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn stream_timeout(&self) -> Duration {
        self.stream_timeout
    }

    pub fn media_policy(&self) -> MediaPolicy {
        match &self.media_extensions {
            Some(extensions) => MediaPolicy::default().with_extensions(extensions),
            None => MediaPolicy::default(),
        }
    }

    /// Build the tool this configuration describes
    pub fn tool(&self) -> Result<Tool, FetchError> {
        let mut builder = Tool::builder()
            .fetch_timeout(self.fetch_timeout)
            .stream_timeout(self.stream_timeout)
            .media_policy(self.media_policy());
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder.build()
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds {
            name,
            value: value.to_string(),
        }),
    }
}
