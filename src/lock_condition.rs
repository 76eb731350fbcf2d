//! Strategy C: one lock, two conditions.
//!
//! Producers wait on `not_full` and announce on `not_empty`; consumers wait
//! on `not_empty` and announce on `not_full`. A broadcast only reaches the
//! side that can make progress, so producers never wake producers and
//! consumers never wake consumers. This is the default strategy.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::buffer::{BoundedBuffer, BufferStats, Strategy};
use crate::cancel::{self, CancelWatcher};
use crate::error::BufferError;
use crate::guarded::{self, Deadline, Guarded};

struct Shared<T> {
    state: Mutex<Guarded<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

pub struct LockConditionBuffer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    token: CancellationToken,
    _watcher: CancelWatcher,
}

impl<T: Send + 'static> LockConditionBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        Self::with_token(capacity, &CancellationToken::new())
    }

    pub fn with_token(capacity: usize, parent: &CancellationToken) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity(capacity));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(Guarded::new(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        });
        let token = parent.child_token();

        let weak = Arc::downgrade(&shared);
        let watcher = cancel::watch(&token, move || {
            if let Some(shared) = weak.upgrade() {
                let _state = guarded::lock(&shared.state);
                shared.not_full.notify_all();
                shared.not_empty.notify_all();
            }
        })?;

        Ok(Self {
            shared,
            capacity,
            token,
            _watcher: watcher,
        })
    }
}

impl<T> LockConditionBuffer<T> {
    fn put(&self, value: T, deadline: Option<&Deadline>) -> Result<(), BufferError> {
        let mut state = guarded::lock(&self.shared.state);
        while state.is_full() {
            let (next, woken) =
                guarded::park(&self.shared.not_full, state, &self.token, deadline)?;
            state = next;
            if woken {
                state.note_wakeup();
            }
            trace!(strategy = "lock-condition", len = state.len(), "producer woke");
        }

        state.push(value);
        debug!(strategy = "lock-condition", len = state.len(), "produced");
        self.shared.not_empty.notify_all();
        Ok(())
    }

    fn take(&self, deadline: Option<&Deadline>) -> Result<T, BufferError> {
        let mut state = guarded::lock(&self.shared.state);
        loop {
            if let Some(value) = state.pop() {
                debug!(strategy = "lock-condition", len = state.len(), "consumed");
                self.shared.not_full.notify_all();
                return Ok(value);
            }
            let (next, woken) =
                guarded::park(&self.shared.not_empty, state, &self.token, deadline)?;
            state = next;
            if woken {
                state.note_wakeup();
            }
            trace!(strategy = "lock-condition", len = state.len(), "consumer woke");
        }
    }
}

impl<T: Send> BoundedBuffer<T> for LockConditionBuffer<T> {
    fn produce(&self, value: T) -> Result<(), BufferError> {
        self.put(value, None)
    }

    fn produce_timeout(&self, value: T, timeout: Duration) -> Result<(), BufferError> {
        self.put(value, Deadline::after(timeout).as_ref())
    }

    fn try_produce(&self, value: T) -> Result<(), BufferError> {
        let mut state = guarded::lock(&self.shared.state);
        if state.is_full() {
            return Err(BufferError::Full);
        }
        state.push(value);
        self.shared.not_empty.notify_all();
        Ok(())
    }

    fn consume(&self) -> Result<T, BufferError> {
        self.take(None)
    }

    fn consume_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        self.take(Deadline::after(timeout).as_ref())
    }

    fn try_consume(&self) -> Result<T, BufferError> {
        let mut state = guarded::lock(&self.shared.state);
        let value = state.pop().ok_or(BufferError::Empty)?;
        self.shared.not_full.notify_all();
        Ok(value)
    }

    fn len(&self) -> usize {
        guarded::lock(&self.shared.state).len()
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
        guarded::lock(&self.shared.state).stats()
    }

    fn strategy(&self) -> Strategy {
        Strategy::LockCondition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    type Waiting = Vec<thread::JoinHandle<Result<(), BufferError>>>;

    /// Fills a capacity-1 buffer with 0 and parks two producers behind it.
    fn parked_producers(buffer: &Arc<LockConditionBuffer<i32>>) -> Waiting {
        buffer.produce(0).unwrap();
        let waiting = (1..=2)
            .map(|v| {
                let buffer = Arc::clone(buffer);
                thread::spawn(move || buffer.produce(v))
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        waiting
    }

    #[test]
    fn test_push_does_not_rewake_parked_producer() {
        let buffer = Arc::new(LockConditionBuffer::new(1).unwrap());
        let waiting = parked_producers(&buffer);
        assert_eq!(buffer.stats().wakeups, 0);

        // The consume wakes both producers; the winner's push announces on
        // `not_empty` only, so the loser re-parks without another wake-up.
        assert_eq!(buffer.consume(), Ok(0));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.stats().wakeups, 2);

        let second = buffer.consume().unwrap();
        for w in waiting {
            w.join().unwrap().unwrap();
        }
        let third = buffer.consume().unwrap();
        let mut drained = vec![second, third];
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(buffer.stats().wakeups, 3);
    }

    #[test]
    fn test_push_reaches_parked_consumer() {
        let buffer = Arc::new(LockConditionBuffer::new(2).unwrap());
        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.consume())
        };
        thread::sleep(Duration::from_millis(50));

        // Announcing on the wrong condition would leave the consumer parked.
        buffer.produce(5).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(5));
        assert_eq!(buffer.stats().wakeups, 1);
    }

    #[test]
    fn test_timed_out_wait_is_not_a_wakeup() {
        let buffer = LockConditionBuffer::<i32>::new(1).unwrap();
        let timeout = Duration::from_millis(20);
        assert_eq!(buffer.consume_timeout(timeout), Err(BufferError::Timeout(timeout)));
        buffer.produce(1).unwrap();
        assert_eq!(buffer.produce_timeout(2, timeout), Err(BufferError::Timeout(timeout)));
        assert_eq!(buffer.stats().wakeups, 0);
    }

    #[test]
    fn test_consume_timeout_then_value_arrives() {
        let buffer = Arc::new(LockConditionBuffer::new(2).unwrap());
        assert_eq!(
            buffer.consume_timeout(Duration::from_millis(10)),
            Err(BufferError::Timeout(Duration::from_millis(10)))
        );

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                buffer.produce(42)
            })
        };
        assert_eq!(buffer.consume_timeout(Duration::from_secs(5)), Ok(42));
        producer.join().unwrap().unwrap();
    }

    #[test]
    fn test_new_rejects_zero_capacity() {
        assert!(matches!(
            LockConditionBuffer::<u32>::new(0),
            Err(BufferError::InvalidCapacity(0))
        ));
    }
}
