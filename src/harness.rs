//! Workload runner with a progress watchdog, shared by the tests and the
//! throughput benchmark.
//!
//! A run that stops making progress for a whole `window` is treated as a
//! deadlock: the watchdog cancels it (which unblocks every waiter) and
//! reports [`HarnessError::Stalled`] instead of hanging the test binary.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::buffer::BoundedBuffer;
use crate::config::{DemoConfig, ValueSource};
use crate::driver::{self, RunReport};
use crate::error::{DriverError, HarnessError};

#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub producers: usize,
    pub consumers: usize,
    pub per_producer: u64,
}

impl Workload {
    pub fn total(&self) -> u64 {
        self.per_producer * self.producers as u64
    }

    fn config(&self, buffer: &dyn BoundedBuffer<i64>) -> DemoConfig {
        DemoConfig {
            strategy: buffer.strategy(),
            capacity: buffer.capacity(),
            producers: self.producers,
            consumers: self.consumers,
            iterations: Some(self.per_producer),
            delay_ms: 0,
            duration_ms: None,
            values: ValueSource::Sequential,
        }
    }
}

fn progress(buffer: &dyn BoundedBuffer<i64>) -> u64 {
    let stats = buffer.stats();
    stats.produced + stats.consumed
}

/// Drives `workload` through `buffer` with no artificial delay, failing if
/// neither side completes an operation for `window`.
pub fn run_watched(
    buffer: Arc<dyn BoundedBuffer<i64>>,
    workload: &Workload,
    window: Duration,
) -> Result<RunReport, HarnessError> {
    let config = workload.config(buffer.as_ref());
    let token = CancellationToken::new();
    let (done_tx, done_rx) = channel::bounded::<()>(1);

    let runner = {
        let buffer = Arc::clone(&buffer);
        let token = token.clone();
        thread::Builder::new()
            .name("harness-driver".into())
            .spawn(move || {
                let report = driver::run_on(buffer, &config, &token);
                let _ = done_tx.send(());
                report
            })
            .map_err(DriverError::Spawn)?
    };

    let mut last = progress(buffer.as_ref());
    let stalled = loop {
        match done_rx.recv_timeout(window) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break None,
            Err(RecvTimeoutError::Timeout) => {
                let now = progress(buffer.as_ref());
                if now == last {
                    warn!(?window, progress = now, "no progress, cancelling workload");
                    token.cancel();
                    break Some(now);
                }
                last = now;
            }
        }
    };

    let report = runner
        .join()
        .map_err(|_| DriverError::WorkerPanicked("harness-driver".into()))??;

    match stalled {
        Some(progress) => Err(HarnessError::Stalled { window, progress }),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{build, BufferStats, Strategy};
    use crate::error::BufferError;

    /// Never lets anyone through: every blocking call waits for cancellation.
    struct Jammed {
        token: CancellationToken,
    }

    impl BoundedBuffer<i64> for Jammed {
        fn produce(&self, _value: i64) -> Result<(), BufferError> {
            futures::executor::block_on(self.token.cancelled());
            Err(BufferError::Cancelled)
        }

        fn produce_timeout(&self, _value: i64, timeout: Duration) -> Result<(), BufferError> {
            Err(BufferError::Timeout(timeout))
        }

        fn try_produce(&self, _value: i64) -> Result<(), BufferError> {
            Err(BufferError::Full)
        }

        fn consume(&self) -> Result<i64, BufferError> {
            futures::executor::block_on(self.token.cancelled());
            Err(BufferError::Cancelled)
        }

        fn consume_timeout(&self, timeout: Duration) -> Result<i64, BufferError> {
            Err(BufferError::Timeout(timeout))
        }

        fn try_consume(&self) -> Result<i64, BufferError> {
            Err(BufferError::Empty)
        }

        fn len(&self) -> usize {
            0
        }

        fn capacity(&self) -> usize {
            1
        }

        fn cancel(&self) {
            self.token.cancel();
        }

        fn is_cancelled(&self) -> bool {
            self.token.is_cancelled()
        }

        fn stats(&self) -> BufferStats {
            BufferStats::default()
        }

        fn strategy(&self) -> Strategy {
            Strategy::Monitor
        }
    }

    #[test]
    fn test_watchdog_reports_stall() {
        let jammed = Arc::new(Jammed {
            token: CancellationToken::new(),
        });
        let workload = Workload {
            producers: 2,
            consumers: 2,
            per_producer: 10,
        };

        let err = run_watched(jammed.clone(), &workload, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, HarnessError::Stalled { progress: 0, .. }));
        assert!(jammed.is_cancelled());
    }

    #[test]
    fn test_clean_run_passes() {
        let buffer = build::<i64>(Strategy::LockCondition, 4, &CancellationToken::new()).unwrap();
        let workload = Workload {
            producers: 2,
            consumers: 2,
            per_producer: 100,
        };
        let report = run_watched(buffer, &workload, Duration::from_secs(5)).unwrap();
        assert_eq!(report.consumed, workload.total());
    }
}
