mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use defaults::*;
use serde::{Deserialize, Serialize};

use crate::{ListenEndpoint, Secret, TodoError};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "_default_http_listen")]
    pub listen: ListenEndpoint,

    #[serde(default)]
    pub trust_x_forwarded_headers: bool,

    #[serde(default = "_default_session_max_age", with = "humantime_serde")]
    pub session_max_age: Duration,

    #[serde(default = "_default_api_token_ttl", with = "humantime_serde")]
    pub api_token_ttl: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            listen: _default_http_listen(),
            trust_x_forwarded_headers: false,
            session_max_age: _default_session_max_age(),
            api_token_ttl: _default_api_token_ttl(),
        }
    }
}

/// Order in which queued acquisitions are served once tokens come back
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueProcessingOrder {
    #[serde(rename = "oldest_first", alias = "FIFO", alias = "OldestFirst")]
    #[default]
    OldestFirst,
    #[serde(rename = "newest_first", alias = "LIFO", alias = "NewestFirst")]
    NewestFirst,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    pub token_limit: u32,

    pub tokens_per_period: u32,

    #[serde(with = "humantime_serde")]
    pub replenishment_period: Duration,

    #[serde(default = "_default_true")]
    pub auto_replenishment: bool,

    #[serde(default = "_default_queue_limit")]
    pub queue_limit: u32,

    #[serde(default)]
    pub queue_processing_order: QueueProcessingOrder,
}

impl TokenBucketConfig {
    fn validate(&self, section: &'static str) -> Result<(), TodoError> {
        let invalid = |reason: &str| TodoError::RateLimiterInvalidConfig {
            section,
            reason: reason.to_owned(),
        };
        if self.token_limit == 0 {
            return Err(invalid("token_limit must be greater than zero"));
        }
        if self.tokens_per_period == 0 {
            return Err(invalid("tokens_per_period must be greater than zero"));
        }
        if self.replenishment_period.is_zero() {
            return Err(invalid("replenishment_period must be greater than zero"));
        }
        Ok(())
    }
}

/// Per-operation-class token bucket settings. Both sections are mandatory.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RateLimitingConfig {
    #[serde(rename = "Read", alias = "read")]
    pub read: TokenBucketConfig,

    #[serde(rename = "Write", alias = "write")]
    pub write: TokenBucketConfig,
}

impl RateLimitingConfig {
    pub fn validate(&self) -> Result<(), TodoError> {
        self.read.validate("Read")?;
        self.write.validate("Write")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TodoConfigStore {
    #[serde(default = "_default_database_url")]
    pub database_url: Secret,

    #[serde(default)]
    pub http: HttpConfig,

    pub rate_limiting: RateLimitingConfig,
}

#[derive(Debug, Clone)]
pub struct TodoConfig {
    pub store: TodoConfigStore,
    pub paths_relative_to: PathBuf,
}

impl TodoConfig {
    pub fn validate(&self) -> Result<(), TodoError> {
        self.store.rate_limiting.validate()
    }
}
