//! Typed configuration.
//!
//! Settings come from an optional TOML file, then environment variables win.
//! Call `dotenvy::dotenv().ok()` first in local dev to pick up `.env`.
//! The database URL is wrapped in a `SecretString` so it never hits the logs.
//!
//! ```toml
//! log_level = "debug"
//!
//! [dispatcher]
//! workers = 3
//! queue_capacity = 1024
//! latency_us = 500
//! ```

pub mod secrets;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Sizing of the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Number of workers. Fixed for the dispatcher's lifetime.
    pub workers: usize,
    /// Submissions that may wait for a worker before `submit` rejects.
    pub queue_capacity: usize,
    /// Delay the default transport spends on each message, in microseconds.
    pub latency_us: u64,
}

impl DispatcherConfig {
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us)
    }

    /// Reject sizes the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("dispatcher needs at least one worker".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 1024,
            latency_us: 500,
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub dispatcher: DispatcherConfig,
    pub database_url: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    dispatcher: DispatcherConfig,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            database_url: None,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Read `path` (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], with `lookup` standing in for the environment.
    ///
    /// Validation runs once, after overrides, so an override can repair a
    /// bad file value.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read config {}: {e}", path.display()))
                })?;
                Self::parse_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Parse and validate a TOML document. Secrets are not read from files.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = Self::parse_toml(content)?;
        config.dispatcher.validate()?;
        Ok(config)
    }

    fn parse_toml(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))?;
        Ok(Self {
            dispatcher: file.dispatcher,
            database_url: None,
            otel_endpoint: file.otel_endpoint,
            log_level: file.log_level.unwrap_or_else(|| Self::default().log_level),
        })
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Recognized: `MAILQ_WORKERS`, `MAILQ_QUEUE_CAPACITY`, `MAILQ_LATENCY_US`,
    /// `DATABASE_URL`, `OTEL_ENDPOINT`, `LOG_LEVEL`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("MAILQ_WORKERS") {
            self.dispatcher.workers = parse_var("MAILQ_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MAILQ_QUEUE_CAPACITY") {
            self.dispatcher.queue_capacity = parse_var("MAILQ_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("MAILQ_LATENCY_US") {
            self.dispatcher.latency_us = parse_var("MAILQ_LATENCY_US", &v)?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = Some(SecretString::from(v));
        }
        if let Some(v) = lookup("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        self.dispatcher.validate()
    }

    /// The database URL, or a config error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".into())
        })
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{name}={value:?} is invalid: {e}")))
}
