//! Dynamic concurrency limiter.
//!
//! A counting gate whose ceiling can change at runtime. Shared across the
//! worker pool so download concurrency is a global property, not
//! per-worker. Lowering the ceiling never aborts in-flight work; it only
//! slows new acquires.

use std::pin::pin;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

#[derive(Debug)]
struct LimiterState {
    limit: u32,
    in_flight: u32,
}

/// Counting gate with a hot-reconfigurable ceiling.
#[derive(Debug)]
pub struct DynamicLimiter {
    state: Mutex<LimiterState>,
    notify: Notify,
}

impl DynamicLimiter {
    /// Create a limiter. The ceiling is clamped to at least 1.
    pub fn new(limit: u32) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                limit: limit.max(1),
                in_flight: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.state.lock().limit
    }

    pub fn in_flight(&self) -> u32 {
        self.state.lock().in_flight
    }

    /// Change the ceiling. Raising it wakes every waiting acquirer even
    /// though no release occurred.
    pub fn set_limit(&self, limit: u32) {
        let limit = limit.max(1);
        let mut state = self.state.lock();
        if state.limit == limit {
            return;
        }
        state.limit = limit;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Acquire a slot, waiting until one is available or `cancel` fires.
    ///
    /// Ordering among waiters is not FIFO: every release or ceiling change
    /// wakes all of them and they race for the freed slots.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<LimiterPermit<'_>> {
        loop {
            // Register for wakeups before checking, so a release between the
            // check and the await is not lost.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.in_flight < state.limit {
                    state.in_flight += 1;
                    return Ok(LimiterPermit { limiter: self });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Canceled),
                _ = &mut notified => {}
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if state.in_flight > 0 {
            state.in_flight -= 1;
        }
        drop(state);
        self.notify.notify_waiters();
    }
}

/// A held slot; releases on drop.
#[derive(Debug)]
pub struct LimiterPermit<'a> {
    limiter: &'a DynamicLimiter,
}

impl Drop for LimiterPermit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn acquire_and_release() {
        let limiter = DynamicLimiter::new(1);
        let cancel = CancellationToken::new();

        let permit = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.in_flight(), 1);

        drop(permit);
        assert_eq!(limiter.in_flight(), 0);

        let _again = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.in_flight(), 1);
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_limit() {
        let limiter = Arc::new(DynamicLimiter::new(2));
        let cancel = CancellationToken::new();

        let p1 = limiter.acquire(&cancel).await.unwrap();
        let _p2 = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.in_flight(), 2);

        // A third acquire must block while the gate is saturated.
        let blocked = tokio::time::timeout(Duration::from_millis(50), async {
            let _p = limiter.acquire(&cancel).await.unwrap();
        })
        .await;
        assert!(blocked.is_err());

        drop(p1);
        let _p3 = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
    }

    #[tokio::test]
    async fn set_limit_wakes_waiters_without_a_release() {
        let limiter = Arc::new(DynamicLimiter::new(1));
        let cancel = CancellationToken::new();

        let held = limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire(&cancel).await.unwrap();
            })
        };

        // Give the waiter time to park.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        limiter.set_limit(2);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("raised ceiling must wake the waiter")
            .unwrap();

        drop(held);
    }

    #[tokio::test]
    async fn acquire_honors_cancellation() {
        let limiter = DynamicLimiter::new(1);
        let cancel = CancellationToken::new();
        let _held = limiter.acquire(&cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let trigger = waiter_cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = limiter.acquire(&waiter_cancel).await.unwrap_err();
        assert!(matches!(err, Error::Canceled));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "returned too late: {elapsed:?}");
    }

    #[tokio::test]
    async fn lowering_limit_does_not_evict_holders() {
        let limiter = DynamicLimiter::new(2);
        let cancel = CancellationToken::new();
        let _p1 = limiter.acquire(&cancel).await.unwrap();
        let _p2 = limiter.acquire(&cancel).await.unwrap();

        limiter.set_limit(1);
        assert_eq!(limiter.limit(), 1);
        // Existing holders keep their slots.
        assert_eq!(limiter.in_flight(), 2);
    }
}
