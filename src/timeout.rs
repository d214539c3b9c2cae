//! A cancellable wall-clock timeout handle (spec §5 "Cancellation/timeout").
//!
//! `SetTimeLimit(seconds)` replaces the deadline (0 or negative means
//! unlimited). The dispatch loop polls [`TimeoutHandle::expired`] between
//! instructions; expiration lets the current opcode finish before the
//! loop exits with a timeout error.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Inner {
    started_at: Instant,
    deadline_ms: AtomicI64,
    cancelled: AtomicBool,
}

#[derive(Clone)]
pub struct TimeoutHandle {
    inner: Arc<Inner>,
}

impl TimeoutHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                started_at: Instant::now(),
                deadline_ms: AtomicI64::new(-1),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// `SetTimeLimit(seconds)`. Zero or negative means unlimited.
    pub fn set_time_limit(&self, seconds: i64) {
        let deadline = if seconds <= 0 { -1 } else { seconds * 1000 };
        self.inner.deadline_ms.store(deadline, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn expired(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        let deadline_ms = self.inner.deadline_ms.load(Ordering::SeqCst);
        if deadline_ms < 0 {
            return false;
        }
        self.inner.started_at.elapsed() >= Duration::from_millis(deadline_ms as u64)
    }
}

impl Default for TimeoutHandle {
    fn default() -> Self {
        Self::new()
    }
}
