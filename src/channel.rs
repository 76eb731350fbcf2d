//! Strategy B: hand the whole job to `crossbeam::channel::bounded`.
//!
//! The channel already enforces capacity, blocks with back-pressure and keeps
//! FIFO order, so nothing here touches a lock. Cancellation is a second
//! channel whose only sender is dropped by the watcher; a disconnected
//! receiver is always ready, which lets `select!` abandon a blocked send or
//! receive.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use crossbeam::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buffer::{BoundedBuffer, BufferStats, Strategy};
use crate::cancel::{self, CancelWatcher};
use crate::error::BufferError;

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    consumed: AtomicU64,
    peak_len: AtomicUsize,
}

pub struct ChannelBuffer<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    cancelled: Receiver<()>,
    capacity: usize,
    token: CancellationToken,
    counters: Counters,
    _watcher: CancelWatcher,
}

impl<T: Send + 'static> ChannelBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        Self::with_token(capacity, &CancellationToken::new())
    }

    pub fn with_token(capacity: usize, parent: &CancellationToken) -> Result<Self, BufferError> {
        // bounded(0) would be a rendezvous channel, not a buffer.
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity(capacity));
        }

        let (tx, rx) = channel::bounded(capacity);
        let (cancel_tx, cancelled) = channel::bounded::<()>(0);
        let token = parent.child_token();
        let watcher = cancel::watch(&token, move || drop(cancel_tx))?;

        Ok(Self {
            tx,
            rx,
            cancelled,
            capacity,
            token,
            counters: Counters::default(),
            _watcher: watcher,
        })
    }
}

impl<T> ChannelBuffer<T> {
    fn put(&self, value: T, timeout: Option<Duration>) -> Result<(), BufferError> {
        let value = match self.tx.try_send(value) {
            Ok(()) => {
                self.on_produced();
                return Ok(());
            }
            Err(TrySendError::Full(value)) => value,
            // Both ends live in `self`.
            Err(TrySendError::Disconnected(_)) => return Err(BufferError::Cancelled),
        };

        let sent = match timeout {
            None => select! {
                send(self.tx, value) -> res => res.map_err(|_| BufferError::Cancelled),
                recv(self.cancelled) -> _ => Err(BufferError::Cancelled),
            },
            Some(timeout) => select! {
                send(self.tx, value) -> res => res.map_err(|_| BufferError::Cancelled),
                recv(self.cancelled) -> _ => Err(BufferError::Cancelled),
                default(timeout) => Err(BufferError::Timeout(timeout)),
            },
        };
        sent?;
        self.on_produced();
        Ok(())
    }

    fn take(&self, timeout: Option<Duration>) -> Result<T, BufferError> {
        match self.rx.try_recv() {
            Ok(value) => return Ok(self.on_consumed(value)),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Err(BufferError::Cancelled),
        }

        let received = match timeout {
            None => select! {
                recv(self.rx) -> msg => msg.map_err(|_| BufferError::Cancelled),
                recv(self.cancelled) -> _ => Err(BufferError::Cancelled),
            },
            Some(timeout) => select! {
                recv(self.rx) -> msg => msg.map_err(|_| BufferError::Cancelled),
                recv(self.cancelled) -> _ => Err(BufferError::Cancelled),
                default(timeout) => Err(BufferError::Timeout(timeout)),
            },
        };
        Ok(self.on_consumed(received?))
    }

    fn on_produced(&self) {
        self.counters.produced.fetch_add(1, Ordering::Relaxed);
        let len = self.tx.len();
        self.counters.peak_len.fetch_max(len, Ordering::Relaxed);
        debug!(strategy = "channel", len, "produced");
    }

    fn on_consumed(&self, value: T) -> T {
        self.counters.consumed.fetch_add(1, Ordering::Relaxed);
        debug!(strategy = "channel", len = self.rx.len(), "consumed");
        value
    }
}

impl<T: Send> BoundedBuffer<T> for ChannelBuffer<T> {
    fn produce(&self, value: T) -> Result<(), BufferError> {
        self.put(value, None)
    }

    fn produce_timeout(&self, value: T, timeout: Duration) -> Result<(), BufferError> {
        self.put(value, Some(timeout))
    }

    fn try_produce(&self, value: T) -> Result<(), BufferError> {
        match self.tx.try_send(value) {
            Ok(()) => {
                self.on_produced();
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(BufferError::Full),
            Err(TrySendError::Disconnected(_)) => Err(BufferError::Cancelled),
        }
    }

    fn consume(&self) -> Result<T, BufferError> {
        self.take(None)
    }

    fn consume_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        self.take(Some(timeout))
    }

    fn try_consume(&self) -> Result<T, BufferError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(self.on_consumed(value)),
            Err(TryRecvError::Empty) => Err(BufferError::Empty),
            Err(TryRecvError::Disconnected) => Err(BufferError::Cancelled),
        }
    }

    fn len(&self) -> usize {
        self.rx.len()
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
        BufferStats {
            produced: self.counters.produced.load(Ordering::Relaxed),
            consumed: self.counters.consumed.load(Ordering::Relaxed),
            peak_len: self.counters.peak_len.load(Ordering::Relaxed),
            wakeups: 0,
        }
    }

    fn strategy(&self) -> Strategy {
        Strategy::Channel
    }
}
