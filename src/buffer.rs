//! The bounded-buffer contract and the factory over its three strategies.
//!
//! ```text
//!   producers ──produce()──▶ [ v1 | v2 | v3 |    |    ] ──consume()──▶ consumers
//!                              head                cap
//! ```
//!
//! `produce` blocks while the buffer is full, `consume` blocks while it is
//! empty. Every strategy keeps strict FIFO order and unblocks waiters with
//! [`BufferError::Cancelled`] when its token is cancelled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelBuffer;
use crate::error::BufferError;
use crate::lock_condition::LockConditionBuffer;
use crate::monitor::MonitorBuffer;

pub const DEFAULT_CAPACITY: usize = 5;

/// A fixed-capacity FIFO shared by any number of producers and consumers.
pub trait BoundedBuffer<T>: Send + Sync {
    /// Appends `value`, blocking while the buffer is full.
    ///
    /// # Errors
    ///
    /// - `BufferError::Cancelled` if the buffer's token fires while waiting
    fn produce(&self, value: T) -> Result<(), BufferError>;

    /// Like [`produce`](Self::produce) but gives up after `timeout`.
    fn produce_timeout(&self, value: T, timeout: Duration) -> Result<(), BufferError>;

    /// Appends `value` only if there is room right now.
    fn try_produce(&self, value: T) -> Result<(), BufferError>;

    /// Removes the oldest value, blocking while the buffer is empty.
    ///
    /// # Errors
    ///
    /// - `BufferError::Cancelled` if the buffer's token fires while waiting
    fn consume(&self) -> Result<T, BufferError>;

    /// Like [`consume`](Self::consume) but gives up after `timeout`.
    fn consume_timeout(&self, timeout: Duration) -> Result<T, BufferError>;

    /// Removes the oldest value only if one is available right now.
    fn try_consume(&self) -> Result<T, BufferError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    /// Cancels the buffer's token, waking every blocked caller.
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;

    fn stats(&self) -> BufferStats;

    fn strategy(&self) -> Strategy;
}

/// Counters observed since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    pub produced: u64,
    pub consumed: u64,
    /// Highest length ever observed; never above capacity.
    pub peak_len: usize,
    /// Times a blocked caller was notified out of a condvar wait; waits that
    /// merely expire are not counted. Always 0 for the channel strategy, whose
    /// waiters live inside crossbeam.
    pub wakeups: u64,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One lock, one shared wait set, broadcast on every change.
    Monitor,
    /// Delegates to `crossbeam::channel::bounded`.
    Channel,
    /// One lock, separate `not_full` / `not_empty` conditions.
    #[default]
    LockCondition,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Monitor, Strategy::Channel, Strategy::LockCondition];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Monitor => "monitor",
            Strategy::Channel => "channel",
            Strategy::LockCondition => "lock-condition",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a buffer whose blocked callers wake up when `token` is cancelled.
pub fn build<T: Send + 'static>(
    strategy: Strategy,
    capacity: usize,
    token: &CancellationToken,
) -> Result<Arc<dyn BoundedBuffer<T>>, BufferError> {
    let buffer: Arc<dyn BoundedBuffer<T>> = match strategy {
        Strategy::Monitor => Arc::new(MonitorBuffer::with_token(capacity, token)?),
        Strategy::Channel => Arc::new(ChannelBuffer::with_token(capacity, token)?),
        Strategy::LockCondition => Arc::new(LockConditionBuffer::with_token(capacity, token)?),
    };
    Ok(buffer)
}

// =============================================================================
// Contract tests: every strategy runs the same cases
// =============================================================================
