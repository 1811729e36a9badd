//! Wall clock and sleep seam.
//!
//! The compiler stamps banners, the trigger runner names capture files and the
//! tail loop sleeps between polls and reopen attempts, all through [`Clock`],
//! so tests can pin the epoch and observe requested delays.

use std::future::Future;
use std::time::Duration;

/// Time source used by every engine component.
pub trait Clock: Send + Sync + 'static {
    /// Current unix time in whole seconds.
    fn now_epoch_secs(&self) -> u64;

    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Production clock: system time and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
