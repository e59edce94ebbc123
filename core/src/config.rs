//! Declarative client configuration.
//!
//! `ClientConfig` is plain serde data so it can be embedded in whatever
//! configuration file the host application already loads, or read from the
//! environment with [`ClientConfig::from_env`]. String options are only
//! parsed when a client is built from the config, and an unrecognized value
//! fails that build.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{SerializationPolicy, UnknownFields};
use crate::date::DateFormat;
use crate::error::RestError;
use crate::naming::NamingConvention;

/// Response timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime worker threads used when none are configured.
pub const DEFAULT_WORKER_THREADS: usize = 2;

const ENV_PREFIX: &str = "REST_FACADE_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Prefix for relative call URLs.
    pub base_url: Option<String>,
    /// Naming convention name, e.g. `snake_case` or `camelCase`.
    pub naming: String,
    /// `ignore` or `fail`.
    pub unknown_fields: String,
    /// `iso8601` or a strftime pattern.
    pub date_format: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: Option<u64>,
    pub worker_threads: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            naming: NamingConvention::default().as_str().to_string(),
            unknown_fields: UnknownFields::default().to_string(),
            date_format: DateFormat::default().to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: None,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }
}

impl ClientConfig {
    /// Reads `REST_FACADE_*` variables on top of the defaults:
    /// `BASE_URL`, `NAMING`, `UNKNOWN_FIELDS`, `DATE_FORMAT`, `TIMEOUT_MS`,
    /// `CONNECT_TIMEOUT_MS`, `WORKER_THREADS`.
    pub fn from_env() -> Result<Self, RestError> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RestError> {
        let mut config = Self::default();
        if let Some(v) = lookup("BASE_URL") {
            config.base_url = Some(v);
        }
        if let Some(v) = lookup("NAMING") {
            config.naming = v;
        }
        if let Some(v) = lookup("UNKNOWN_FIELDS") {
            config.unknown_fields = v;
        }
        if let Some(v) = lookup("DATE_FORMAT") {
            config.date_format = v;
        }
        if let Some(v) = lookup("TIMEOUT_MS") {
            config.timeout_ms = parse_number("TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = Some(parse_number("CONNECT_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("WORKER_THREADS") {
            config.worker_threads = parse_number("WORKER_THREADS", &v)?;
        }
        Ok(config)
    }

    /// Parses the serialization options into a validated policy.
    pub fn policy(&self) -> Result<SerializationPolicy, RestError> {
        SerializationPolicy::builder()
            .naming(self.naming.parse()?)
            .unknown_fields(self.unknown_fields.parse()?)
            .date_format(self.date_format.parse()?)
            .build()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RestError> {
    value.trim().parse().map_err(|_| {
        RestError::configuration(format!("{ENV_PREFIX}{key} must be a number, got `{value}`"))
    })
}
