//! Reprocessing configuration.
//!
//! Configuration is read through a [`ConfigSource`] on every call so that
//! changes (for instance a raised retry limit) apply to the next pass without
//! a restart.
//!
//! Environment variables read by [`EnvConfig`]:
//!
//! | variable | meaning |
//! |----------|---------|
//! | `REPROCESS_RETRY_LIMIT` | required, max attempts before giving up |
//! | `REPROCESS_FAILED_<DOMAIN>_LIMIT` | optional default batch size |
//! | `<DOMAIN>_QUEUE_URL` | required, publish target |
//! | `REPROCESS_IO_TIMEOUT_MS` | store/queue call timeout, default 5000 |
//! | `REPROCESS_BATCH_HARD_CAP` | upper bound on any batch, default 1000 |
//! | `SERVICE_MONIKER` | `x-client-service-moniker`, default `reprocessor` |
//!
//! `<DOMAIN>` is the upper-cased domain name (`CUSTOMERS`, `ORDERS`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub const RETRY_LIMIT_VAR: &str = "REPROCESS_RETRY_LIMIT";
pub const IO_TIMEOUT_VAR: &str = "REPROCESS_IO_TIMEOUT_MS";
pub const BATCH_HARD_CAP_VAR: &str = "REPROCESS_BATCH_HARD_CAP";
pub const SERVICE_MONIKER_VAR: &str = "SERVICE_MONIKER";

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_BATCH_HARD_CAP: u32 = 1000;
pub const DEFAULT_SERVICE_MONIKER: &str = "reprocessor";

/// Effective configuration for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprocessConfig {
    pub retry_limit: u32,
    /// Default batch size when the request does not name one.
    pub batch_reprocess_limit: Option<u32>,
    /// Queue URL or stream name messages are published to.
    pub queue_target: String,
    pub io_timeout: Duration,
    pub batch_hard_cap: u32,
    pub service_moniker: String,
}

impl ReprocessConfig {
    pub fn new(retry_limit: u32, queue_target: impl Into<String>) -> Self {
        Self {
            retry_limit,
            batch_reprocess_limit: None,
            queue_target: queue_target.into(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            batch_hard_cap: DEFAULT_BATCH_HARD_CAP,
            service_moniker: DEFAULT_SERVICE_MONIKER.to_string(),
        }
    }

    pub fn with_batch_limit(mut self, limit: u32) -> Self {
        self.batch_reprocess_limit = Some(limit);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_batch_hard_cap(mut self, cap: u32) -> Self {
        self.batch_hard_cap = cap;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(String),

    #[error("invalid configuration {key}={value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Source of per-domain configuration.
pub trait ConfigSource: Send + Sync {
    fn load(&self, domain: &str) -> Result<ReprocessConfig, ConfigError>;
}

impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    fn load(&self, domain: &str) -> Result<ReprocessConfig, ConfigError> {
        (**self).load(domain)
    }
}

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Configuration read from environment variables on each call.
#[derive(Clone)]
pub struct EnvConfig {
    lookup: Arc<Lookup>,
}

impl core::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnvConfig").finish_non_exhaustive()
    }
}

impl EnvConfig {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    pub fn batch_limit_var(domain: &str) -> String {
        format!("REPROCESS_FAILED_{}_LIMIT", domain.to_uppercase())
    }

    pub fn queue_url_var(domain: &str) -> String {
        format!("{}_QUEUE_URL", domain.to_uppercase())
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parse<T>(&self, key: &str, raw: String) -> Result<T, ConfigError>
    where
        T: core::str::FromStr,
        T::Err: core::fmt::Display,
    {
        raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
    }

    fn optional<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: core::str::FromStr,
        T::Err: core::fmt::Display,
    {
        self.get(key).map(|raw| self.parse(key, raw)).transpose()
    }
}

impl ConfigSource for EnvConfig {
    fn load(&self, domain: &str) -> Result<ReprocessConfig, ConfigError> {
        let retry_limit = self.parse(RETRY_LIMIT_VAR, self.require(RETRY_LIMIT_VAR)?)?;
        let queue_var = Self::queue_url_var(domain);
        let queue_target = self.require(&queue_var)?;

        let batch_hard_cap = self
            .optional::<u32>(BATCH_HARD_CAP_VAR)?
            .unwrap_or(DEFAULT_BATCH_HARD_CAP);
        if batch_hard_cap == 0 {
            return Err(ConfigError::Invalid {
                key: BATCH_HARD_CAP_VAR.to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let io_timeout = self
            .optional::<u64>(IO_TIMEOUT_VAR)?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_IO_TIMEOUT);

        Ok(ReprocessConfig {
            retry_limit,
            batch_reprocess_limit: self.optional(&Self::batch_limit_var(domain))?,
            queue_target,
            io_timeout,
            batch_hard_cap,
            service_moniker: self
                .get(SERVICE_MONIKER_VAR)
                .unwrap_or_else(|| DEFAULT_SERVICE_MONIKER.to_string()),
        })
    }
}

/// Fixed configuration, optionally overridden per domain.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    default: ReprocessConfig,
    per_domain: HashMap<String, ReprocessConfig>,
}

impl StaticConfig {
    pub fn new(default: ReprocessConfig) -> Self {
        Self {
            default,
            per_domain: HashMap::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>, config: ReprocessConfig) -> Self {
        self.per_domain.insert(domain.into(), config);
        self
    }
}

impl ConfigSource for StaticConfig {
    fn load(&self, domain: &str) -> Result<ReprocessConfig, ConfigError> {
        Ok(self
            .per_domain
            .get(domain)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}
