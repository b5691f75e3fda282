//! Injected time source for the scroll loop and retry backoff.
//!
//! Production code uses [`SystemClock`]. Tests use [`ManualClock`], whose
//! `sleep` advances virtual time instantly, so pauses and backoff delays are
//! fast-forwarded without touching the runtime timer.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Monotonic time plus an awaitable sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;
    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
pub struct SystemClock {
    start: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for deterministic tests.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_fast_forwards() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.sleep(Duration::from_millis(1500)).await;
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.elapsed(), Duration::from_secs(2));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_sleeps() {
        let clock = SystemClock::new();
        clock.sleep(Duration::from_secs(5)).await;
        assert!(clock.elapsed() >= Duration::from_secs(5));
    }
}
