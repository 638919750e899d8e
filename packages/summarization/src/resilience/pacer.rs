//! Request pacing for model calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces model calls at least `60000 / requests_per_minute` milliseconds
/// apart and releases waiters in arrival order.
///
/// The turnstile is a tokio mutex, which queues fairly; the governor
/// cell behind it enforces the spacing. Rates above one call per
/// millisecond round the interval down to zero and pacing is skipped.
pub struct RequestPacer {
    turnstile: Mutex<()>,
    cell: Option<DirectLimiter>,
    interval: Duration,
    waiting: AtomicUsize,
}

impl RequestPacer {
    /// `requests_per_minute` must be nonzero; configuration validation
    /// upstream guarantees it.
    pub fn new(requests_per_minute: u32) -> Self {
        let interval = Duration::from_millis(u64::from(60_000 / requests_per_minute.max(1)));
        let cell = Quota::with_period(interval).map(RateLimiter::direct);
        Self {
            turnstile: Mutex::new(()),
            cell,
            interval,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Wait for this caller's turn. Returns once the pacing interval has
    /// passed since the previous caller was released.
    pub async fn acquire(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let _turn = self.turnstile.lock().await;
        if let Some(cell) = &self.cell {
            cell.until_ready().await;
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }

    /// Callers currently queued, the one being paced included.
    pub fn pending(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Enforced spacing between calls.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
