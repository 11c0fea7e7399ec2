use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use todogate_common::{RateLimitingConfig, TodoError, TokenBucketConfig};
use tracing::*;

use super::{Lease, OperationClass, PartitionKey, TokenBucket};

/// A limiter as seen by callers. Unlimited handles admit everything.
#[derive(Clone, Debug)]
pub struct RateLimiterHandle {
    inner: Option<Arc<TokenBucket>>,
}

impl RateLimiterHandle {
    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    pub fn limited(bucket: Arc<TokenBucket>) -> Self {
        Self {
            inner: Some(bucket),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.inner.is_some()
    }

    pub fn try_acquire(&self, cost: u32) -> Lease {
        match &self.inner {
            Some(bucket) => bucket.try_acquire(cost),
            None => Lease::granted(),
        }
    }

    pub async fn acquire(&self, cost: u32) -> Lease {
        match &self.inner {
            Some(bucket) => bucket.acquire(cost).await,
            None => Lease::granted(),
        }
    }

    /// Whether both handles draw from the same bucket
    pub fn same_limiter(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Lazily creates and caches one [TokenBucket] per [PartitionKey].
///
/// Entries are never evicted, so memory grows with the number of distinct
/// users seen since startup.
pub struct RateLimiterRegistry {
    config: RateLimitingConfig,
    limiters: Mutex<HashMap<PartitionKey, Arc<TokenBucket>>>,
}

impl RateLimiterRegistry {
    pub fn new(config: RateLimitingConfig) -> Result<Self, TodoError> {
        config.validate()?;
        Ok(Self {
            config,
            limiters: Mutex::new(HashMap::new()),
        })
    }

    #[allow(clippy::unwrap_used, reason = "panic on poison")]
    fn lock(&self) -> MutexGuard<'_, HashMap<PartitionKey, Arc<TokenBucket>>> {
        self.limiters.lock().unwrap()
    }

    pub fn config_for(&self, class: OperationClass) -> &TokenBucketConfig {
        match class {
            OperationClass::Read => &self.config.read,
            OperationClass::Write => &self.config.write,
        }
    }

    /// Must be called inside a tokio runtime since new buckets may start
    /// their replenishment task
    pub fn get_or_create(&self, key: &PartitionKey) -> RateLimiterHandle {
        let Some(class) = key.class() else {
            return RateLimiterHandle::unlimited();
        };

        let mut limiters = self.lock();
        let bucket = limiters
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(%key, "Creating rate limiter");
                TokenBucket::new(self.config_for(class).clone())
            })
            .clone();
        RateLimiterHandle::limited(bucket)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
