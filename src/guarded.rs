//! State and condvar plumbing shared by the two lock-based strategies.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::buffer::BufferStats;
use crate::error::BufferError;

/// Everything behind the buffer's one lock.
#[derive(Debug)]
pub(crate) struct Guarded<T> {
    queue: VecDeque<T>,
    capacity: usize,
    stats: BufferStats,
}

impl<T> Guarded<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            stats: BufferStats::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    pub(crate) fn push(&mut self, value: T) {
        self.queue.push_back(value);
        let len = self.queue.len();
        assert!(
            len <= self.capacity,
            "bounded buffer overflow: length {len} exceeds capacity {}",
            self.capacity
        );
        self.stats.produced += 1;
        self.stats.peak_len = self.stats.peak_len.max(len);
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        let value = self.queue.pop_front()?;
        self.stats.consumed += 1;
        Some(value)
    }

    pub(crate) fn note_wakeup(&mut self) {
        self.stats.wakeups += 1;
    }

    pub(crate) fn stats(&self) -> BufferStats {
        self.stats.clone()
    }
}

/// Point in time after which a timed call gives up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    /// `None` when the timeout reaches past what `Instant` can represent;
    /// such a wait is treated as untimed.
    pub(crate) fn after(timeout: Duration) -> Option<Self> {
        let at = Instant::now().checked_add(timeout)?;
        Some(Self { at, timeout })
    }

    fn remaining(&self) -> Option<Duration> {
        self.at
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }
}

/// The queue only changes through `VecDeque` calls that cannot unwind
/// half-way, so a poisoned lock still guards a consistent state.
pub(crate) fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One wait on `cond`. Callers loop and re-check their condition afterwards:
/// a return only means "something may have changed". The flag is `false`
/// when the wait ran out its time instead of being notified.
pub(crate) fn park<'a, S>(
    cond: &Condvar,
    guard: MutexGuard<'a, S>,
    token: &CancellationToken,
    deadline: Option<&Deadline>,
) -> Result<(MutexGuard<'a, S>, bool), BufferError> {
    // Checked under the lock; the watcher takes the same lock before notifying.
    if token.is_cancelled() {
        return Err(BufferError::Cancelled);
    }

    match deadline {
        None => Ok((cond.wait(guard).unwrap_or_else(PoisonError::into_inner), true)),
        Some(deadline) => {
            let remaining = deadline
                .remaining()
                .ok_or(BufferError::Timeout(deadline.timeout))?;
            let (guard, result) = cond
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            if result.timed_out() {
                trace!(?remaining, "wait timed out");
            }
            Ok((guard, !result.timed_out()))
        }
    }
}
