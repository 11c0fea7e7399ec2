//! Per-user request admission.
//!
//! Every request is mapped to a [PartitionKey] made of its [OperationClass]
//! and the caller's [RequestIdentity]. The [RateLimiterRegistry] hands out one
//! [TokenBucket] per key, and the HTTP layer acquires a [Lease] from it before
//! any handler runs.

mod lease;
mod limiter;
mod partition;
mod registry;

pub use lease::Lease;
pub use limiter::TokenBucket;
pub use partition::{OperationClass, PartitionKey, RequestIdentity};
pub use registry::{RateLimiterHandle, RateLimiterRegistry};
