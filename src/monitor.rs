//! Strategy A: a monitor.
//!
//! One mutex and one condition variable. Producers waiting for space and
//! consumers waiting for data share the same wait set, so every change is
//! announced with `notify_all` and each woken thread re-checks its own
//! condition. A producer's broadcast also wakes the other producers, which
//! find the buffer still full and go back to sleep. That wasted work is the
//! price of the single wait set; [`LockConditionBuffer`] avoids it.
//!
//! [`LockConditionBuffer`]: crate::lock_condition::LockConditionBuffer

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::buffer::{BoundedBuffer, BufferStats, Strategy};
use crate::cancel::{self, CancelWatcher};
use crate::error::BufferError;
use crate::guarded::{self, Deadline, Guarded};

struct Monitor<T> {
    state: Mutex<Guarded<T>>,
    changed: Condvar,
}

pub struct MonitorBuffer<T> {
    monitor: Arc<Monitor<T>>,
    capacity: usize,
    token: CancellationToken,
    _watcher: CancelWatcher,
}

impl<T: Send + 'static> MonitorBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        Self::with_token(capacity, &CancellationToken::new())
    }

    /// Blocked callers return `Cancelled` once `parent` is cancelled.
    pub fn with_token(capacity: usize, parent: &CancellationToken) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity(capacity));
        }

        let monitor = Arc::new(Monitor {
            state: Mutex::new(Guarded::new(capacity)),
            changed: Condvar::new(),
        });
        let token = parent.child_token();

        let weak = Arc::downgrade(&monitor);
        let watcher = cancel::watch(&token, move || {
            if let Some(monitor) = weak.upgrade() {
                let _state = guarded::lock(&monitor.state);
                monitor.changed.notify_all();
            }
        })?;

        Ok(Self {
            monitor,
            capacity,
            token,
            _watcher: watcher,
        })
    }
}

impl<T> MonitorBuffer<T> {
    fn put(&self, value: T, deadline: Option<&Deadline>) -> Result<(), BufferError> {
        let mut state = guarded::lock(&self.monitor.state);
        while state.is_full() {
            let (next, woken) =
                guarded::park(&self.monitor.changed, state, &self.token, deadline)?;
            state = next;
            if woken {
                state.note_wakeup();
            }
            trace!(strategy = "monitor", len = state.len(), "producer woke");
        }

        state.push(value);
        debug!(strategy = "monitor", len = state.len(), "produced");
        self.monitor.changed.notify_all();
        Ok(())
    }

    fn take(&self, deadline: Option<&Deadline>) -> Result<T, BufferError> {
        let mut state = guarded::lock(&self.monitor.state);
        loop {
            if let Some(value) = state.pop() {
                debug!(strategy = "monitor", len = state.len(), "consumed");
                self.monitor.changed.notify_all();
                return Ok(value);
            }
            let (next, woken) =
                guarded::park(&self.monitor.changed, state, &self.token, deadline)?;
            state = next;
            if woken {
                state.note_wakeup();
            }
            trace!(strategy = "monitor", len = state.len(), "consumer woke");
        }
    }
}

impl<T: Send> BoundedBuffer<T> for MonitorBuffer<T> {
    fn produce(&self, value: T) -> Result<(), BufferError> {
        self.put(value, None)
    }

    fn produce_timeout(&self, value: T, timeout: Duration) -> Result<(), BufferError> {
        self.put(value, Deadline::after(timeout).as_ref())
    }

    fn try_produce(&self, value: T) -> Result<(), BufferError> {
        let mut state = guarded::lock(&self.monitor.state);
        if state.is_full() {
            return Err(BufferError::Full);
        }
        state.push(value);
        self.monitor.changed.notify_all();
        Ok(())
    }

    fn consume(&self) -> Result<T, BufferError> {
        self.take(None)
    }

    fn consume_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        self.take(Deadline::after(timeout).as_ref())
    }

    fn try_consume(&self) -> Result<T, BufferError> {
        let mut state = guarded::lock(&self.monitor.state);
        let value = state.pop().ok_or(BufferError::Empty)?;
        self.monitor.changed.notify_all();
        Ok(value)
    }

    fn len(&self) -> usize {
        guarded::lock(&self.monitor.state).len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn stats(&self) -> BufferStats {
        guarded::lock(&self.monitor.state).stats()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Monitor
    }
}
