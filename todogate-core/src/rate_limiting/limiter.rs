use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use todogate_common::{QueueProcessingOrder, TokenBucketConfig};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::*;

use super::Lease;

struct Waiter {
    id: u64,
    cost: u32,
    sender: oneshot::Sender<Lease>,
}

struct BucketState {
    tokens: u32,
    last_refill: Instant,
    /// Arrival order, oldest at the front
    queue: VecDeque<Waiter>,
    queued_cost: u32,
    next_waiter_id: u64,
}

/// Token bucket with a bounded waiter queue.
///
/// All state lives behind a sync mutex which is never held across an await.
/// With `auto_replenishment` a background task adds `tokens_per_period` every
/// `replenishment_period` for as long as the bucket is alive; otherwise whole
/// elapsed periods are credited whenever the bucket is touched.
pub struct TokenBucket {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
}

impl Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("token_limit", &self.config.token_limit)
            .field("tokens_per_period", &self.config.tokens_per_period)
            .field("replenishment_period", &self.config.replenishment_period)
            .finish()
    }
}

impl TokenBucket {
    /// Buckets with auto replenishment must be created inside a tokio runtime
    pub fn new(config: TokenBucketConfig) -> Arc<Self> {
        let now = Instant::now();
        let bucket = Arc::new(Self {
            state: Mutex::new(BucketState {
                tokens: config.token_limit,
                last_refill: now,
                queue: VecDeque::new(),
                queued_cost: 0,
                next_waiter_id: 0,
            }),
            config,
        });

        if bucket.config.auto_replenishment {
            tokio::spawn(replenish_periodically(
                Arc::downgrade(&bucket),
                now,
                bucket.config.replenishment_period,
            ));
        }

        bucket
    }

    #[allow(clippy::unwrap_used, reason = "panic on poison")]
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap()
    }

    pub fn available_tokens(&self) -> u32 {
        let mut state = self.lock();
        self.refill_lazily(&mut state, Instant::now());
        state.tokens
    }

    /// Total cost of the acquisitions currently waiting in the queue
    pub fn queued(&self) -> u32 {
        self.lock().queued_cost
    }

    /// Attempts to take `cost` tokens without waiting
    pub fn try_acquire(&self, cost: u32) -> Lease {
        let now = Instant::now();
        let mut state = self.lock();
        self.refill_lazily(&mut state, now);

        if cost > self.config.token_limit {
            return Lease::denied(None);
        }
        if self.can_grant_immediately(&state, cost) {
            state.tokens -= cost;
            return Lease::granted();
        }
        Lease::denied(self.retry_after(&state, cost, now))
    }

    /// Takes `cost` tokens, waiting in the queue if there is room for it.
    ///
    /// Dropping the returned future while it is queued gives the slot back
    /// and never consumes tokens.
    pub async fn acquire(self: &Arc<Self>, cost: u32) -> Lease {
        let pending = {
            let now = Instant::now();
            let mut state = self.lock();
            self.refill_lazily(&mut state, now);

            if cost > self.config.token_limit {
                return Lease::denied(None);
            }
            if self.can_grant_immediately(&state, cost) {
                state.tokens -= cost;
                return Lease::granted();
            }
            if !self.has_room(&state, cost) {
                return Lease::denied(self.retry_after(&state, cost, now));
            }

            let (sender, receiver) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.queue.push_back(Waiter { id, cost, sender });
            state.queued_cost += cost;

            PendingAcquisition {
                bucket: self.clone(),
                id,
                cost,
                receiver,
                finished: false,
            }
        };

        pending.wait().await
    }

    fn can_grant_immediately(&self, state: &BucketState, cost: u32) -> bool {
        if cost == 0 {
            return state.tokens > 0;
        }
        // Oldest-first never lets a newcomer overtake the queue
        state.tokens >= cost
            && (state.queue.is_empty()
                || self.config.queue_processing_order == QueueProcessingOrder::NewestFirst)
    }

    /// Whether `cost` fits into the queue. A full queue never displaces
    /// existing waiters, whatever the processing order.
    fn has_room(&self, state: &BucketState, cost: u32) -> bool {
        let limit = self.config.queue_limit;
        cost > 0 && cost <= limit && limit - state.queued_cost >= cost
    }

    fn retry_after(&self, state: &BucketState, cost: u32, now: Instant) -> Option<Duration> {
        // Newest-first serves a newcomer ahead of everyone already queued
        let ahead = match self.config.queue_processing_order {
            QueueProcessingOrder::OldestFirst => state.queued_cost,
            QueueProcessingOrder::NewestFirst => 0,
        };
        let missing = (u64::from(ahead) + u64::from(cost)).saturating_sub(u64::from(state.tokens));
        if missing == 0 {
            return None;
        }
        let period = self.config.replenishment_period;
        let periods = missing.div_ceil(u64::from(self.config.tokens_per_period));
        let until_next = (state.last_refill + period).saturating_duration_since(now);
        let further = u32::try_from(periods - 1).unwrap_or(u32::MAX);
        Some(until_next.saturating_add(period.saturating_mul(further)))
    }

    fn refill_lazily(&self, state: &mut BucketState, now: Instant) {
        if self.config.auto_replenishment {
            return;
        }
        let period = self.config.replenishment_period.as_nanos();
        let elapsed = now.saturating_duration_since(state.last_refill);
        let periods = elapsed.as_nanos() / period;
        if periods == 0 {
            return;
        }

        let added = periods.saturating_mul(u128::from(self.config.tokens_per_period));
        state.tokens = (u128::from(state.tokens) + added).min(u128::from(self.config.token_limit)) as u32;
        // Keep the partial period so refills stay aligned
        let remainder = Duration::from_nanos((elapsed.as_nanos() % period) as u64);
        state.last_refill = now - remainder;

        self.dispatch_waiters(state);
    }

    fn replenish(&self, now: Instant) {
        let mut state = self.lock();
        state.tokens = state
            .tokens
            .saturating_add(self.config.tokens_per_period)
            .min(self.config.token_limit);
        state.last_refill = now;
        self.dispatch_waiters(&mut state);
    }

    fn dispatch_waiters(&self, state: &mut BucketState) {
        let order = self.config.queue_processing_order;
        loop {
            let next = match order {
                QueueProcessingOrder::OldestFirst => state.queue.front(),
                QueueProcessingOrder::NewestFirst => state.queue.back(),
            };
            match next {
                Some(waiter) if waiter.cost <= state.tokens => (),
                _ => break,
            }
            let waiter = match order {
                QueueProcessingOrder::OldestFirst => state.queue.pop_front(),
                QueueProcessingOrder::NewestFirst => state.queue.pop_back(),
            };
            let Some(waiter) = waiter else {
                break;
            };

            state.queued_cost -= waiter.cost;
            state.tokens -= waiter.cost;
            if waiter.sender.send(Lease::granted()).is_err() {
                state.tokens = state
                    .tokens
                    .saturating_add(waiter.cost)
                    .min(self.config.token_limit);
            }
        }
    }

    fn next_refill_at(&self) -> Instant {
        self.lock().last_refill + self.config.replenishment_period
    }

    fn refill_now(&self) {
        let mut state = self.lock();
        self.refill_lazily(&mut state, Instant::now());
    }
}

async fn replenish_periodically(bucket: Weak<TokenBucket>, start: Instant, period: Duration) {
    let mut interval = tokio::time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(bucket) = bucket.upgrade() else {
            break;
        };
        bucket.replenish(Instant::now());
    }
}

struct PendingAcquisition {
    bucket: Arc<TokenBucket>,
    id: u64,
    cost: u32,
    receiver: oneshot::Receiver<Lease>,
    finished: bool,
}

impl PendingAcquisition {
    async fn wait(mut self) -> Lease {
        let lease = loop {
            if self.bucket.config.auto_replenishment {
                break (&mut self.receiver).await.unwrap_or(Lease::denied(None));
            }
            // Nothing refills a lazy bucket on its own
            let refill_at = self.bucket.next_refill_at();
            tokio::select! {
                result = &mut self.receiver => break result.unwrap_or(Lease::denied(None)),
                _ = tokio::time::sleep_until(refill_at) => self.bucket.refill_now(),
            }
        };
        self.finished = true;
        lease
    }
}

impl Drop for PendingAcquisition {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let mut state = self.bucket.lock();
        if let Some(position) = state.queue.iter().position(|w| w.id == self.id) {
            state.queue.remove(position);
            state.queued_cost -= self.cost;
            debug!("Queued acquisition abandoned");
            self.bucket.dispatch_waiters(&mut state);
        } else if let Ok(lease) = self.receiver.try_recv() {
            // Granted after the caller went away
            if lease.is_acquired() {
                state.tokens = state
                    .tokens
                    .saturating_add(self.cost)
                    .min(self.bucket.config.token_limit);
                self.bucket.dispatch_waiters(&mut state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        token_limit: u32,
        tokens_per_period: u32,
        period: Duration,
        auto_replenishment: bool,
        queue_limit: u32,
        queue_processing_order: QueueProcessingOrder,
    ) -> TokenBucketConfig {
        TokenBucketConfig {
            token_limit,
            tokens_per_period,
            replenishment_period: period,
            auto_replenishment,
            queue_limit,
            queue_processing_order,
        }
    }

    fn lazy(token_limit: u32, tokens_per_period: u32, period: Duration) -> TokenBucketConfig {
        config(
            token_limit,
            tokens_per_period,
            period,
            false,
            0,
            QueueProcessingOrder::OldestFirst,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_until_empty() {
        let bucket = TokenBucket::new(lazy(3, 1, Duration::from_secs(10)));
        for _ in 0..3 {
            assert!(bucket.try_acquire(1).is_acquired());
        }
        let lease = bucket.try_acquire(1);
        assert!(!lease.is_acquired());
        assert_eq!(lease.retry_after, Some(Duration::from_secs(10)));
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_refill_counts_whole_periods() {
        let bucket = TokenBucket::new(lazy(5, 2, Duration::from_secs(1)));
        for _ in 0..5 {
            assert!(bucket.try_acquire(1).is_acquired());
        }

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(bucket.available_tokens(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(bucket.available_tokens(), 2);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(bucket.available_tokens(), 4);

        // The half period left over still counts toward the next refill
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(bucket.available_tokens(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_covers_missing_tokens() {
        let bucket = TokenBucket::new(lazy(2, 1, Duration::from_secs(10)));
        assert!(bucket.try_acquire(2).is_acquired());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(
            bucket.try_acquire(1).retry_after,
            Some(Duration::from_secs(6))
        );
        assert_eq!(
            bucket.try_acquire(2).retry_after,
            Some(Duration::from_secs(16))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cost_above_capacity_is_denied_without_hint() {
        let bucket = TokenBucket::new(lazy(2, 1, Duration::from_secs(1)));
        let lease = bucket.acquire(3).await;
        assert!(!lease.is_acquired());
        assert_eq!(lease.retry_after, None);
        assert_eq!(bucket.available_tokens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_replenishment_single_token() {
        let bucket = TokenBucket::new(config(
            1,
            1,
            Duration::from_secs(1),
            true,
            0,
            QueueProcessingOrder::OldestFirst,
        ));

        assert!(bucket.acquire(1).await.is_acquired());

        let lease = bucket.acquire(1).await;
        assert!(!lease.is_acquired());
        let retry_after = lease.retry_after.unwrap();
        assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(bucket.acquire(1).await.is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_replenishment_never_exceeds_capacity() {
        let bucket = TokenBucket::new(config(
            4,
            3,
            Duration::from_secs(1),
            true,
            0,
            QueueProcessingOrder::OldestFirst,
        ));
        assert!(bucket.try_acquire(1).is_acquired());

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(bucket.available_tokens(), 4);

        for _ in 0..4 {
            assert!(bucket.try_acquire(1).is_acquired());
        }
        assert!(!bucket.try_acquire(1).is_acquired());
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_first_queue() {
        let bucket = TokenBucket::new(config(
            1,
            1,
            Duration::from_secs(1),
            false,
            2,
            QueueProcessingOrder::OldestFirst,
        ));
        assert!(bucket.try_acquire(1).is_acquired());

        let first = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(1).await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(1).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(bucket.queued(), 2);

        // Queue is full
        let lease = bucket.acquire(1).await;
        assert!(!lease.is_acquired());
        assert_eq!(lease.retry_after, Some(Duration::from_secs(3)));

        assert!(first.await.unwrap().is_acquired());
        assert_eq!(bucket.queued(), 1);
        assert!(second.await.unwrap().is_acquired());
        assert_eq!(bucket.queued(), 0);
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newest_first_full_queue_denies_newcomer() {
        let bucket = TokenBucket::new(config(
            1,
            1,
            Duration::from_secs(1),
            false,
            1,
            QueueProcessingOrder::NewestFirst,
        ));
        assert!(bucket.try_acquire(1).is_acquired());

        let queued = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(1).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(bucket.queued(), 1);

        let mut newcomer = Box::pin(bucket.acquire(1));
        let futures::task::Poll::Ready(lease) = futures::poll!(newcomer.as_mut()) else {
            panic!("newcomer should be denied without waiting");
        };
        assert!(!lease.is_acquired());
        // Queued demand is not counted since a newcomer would be served first
        assert_eq!(lease.retry_after, Some(Duration::from_secs(1)));
        assert_eq!(bucket.queued(), 1);

        assert!(queued.await.unwrap().is_acquired());
        assert_eq!(bucket.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newest_first_serves_latest_waiter() {
        let bucket = TokenBucket::new(config(
            1,
            1,
            Duration::from_secs(1),
            false,
            2,
            QueueProcessingOrder::NewestFirst,
        ));
        assert!(bucket.try_acquire(1).is_acquired());

        let older = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(1).await }
        });
        tokio::task::yield_now().await;
        let newer = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(1).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(bucket.queued(), 2);

        assert!(newer.await.unwrap().is_acquired());
        assert_eq!(bucket.queued(), 1);
        assert!(older.await.unwrap().is_acquired());
        assert_eq!(bucket.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_wait_releases_slot() {
        let bucket = TokenBucket::new(config(
            1,
            1,
            Duration::from_secs(1),
            false,
            1,
            QueueProcessingOrder::OldestFirst,
        ));
        assert!(bucket.try_acquire(1).is_acquired());

        let waiter = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(1).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(bucket.queued(), 1);

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(bucket.queued(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.available_tokens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_after_abandonment_is_refunded() {
        let bucket = TokenBucket::new(config(
            1,
            1,
            Duration::from_secs(1),
            false,
            1,
            QueueProcessingOrder::OldestFirst,
        ));
        assert!(bucket.try_acquire(1).is_acquired());

        let mut pending = Box::pin(bucket.acquire(1));
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert_eq!(bucket.queued(), 1);

        // The refill hands the token to the waiter before it gets polled again
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.available_tokens(), 0);
        assert_eq!(bucket.queued(), 0);

        drop(pending);
        assert_eq!(bucket.available_tokens(), 1);
    }
}
