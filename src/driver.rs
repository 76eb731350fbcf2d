//! Runs producer and consumer threads against one shared buffer.
//!
//! Each worker loops `operate -> pause`, where the pause stands in for real
//! work and happens after the buffer call returned, i.e. outside the lock.
//! Bounded runs (`iterations`) split the total evenly among consumers so
//! every thread has a definite end; unbounded runs stop on cancellation.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::buffer::{self, BoundedBuffer, BufferStats, Strategy};
use crate::cancel;
use crate::config::{DemoConfig, ValueSource};
use crate::error::DriverError;

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub strategy: Strategy,
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub produced: u64,
    pub consumed: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub stats: BufferStats,
    /// Everything consumed, grouped by consumer in consumption order.
    #[serde(skip)]
    pub values: Vec<i64>,
}

/// Builds the configured buffer and runs until the workload is done or
/// `token` is cancelled.
pub fn run(config: &DemoConfig, token: &CancellationToken) -> Result<RunReport, DriverError> {
    config.validate()?;
    let buffer = buffer::build::<i64>(config.strategy, config.capacity, token)?;
    run_on(buffer, config, token)
}

/// Like [`run`], but on a caller-supplied buffer. The buffer is cancelled if
/// the run is.
pub fn run_on(
    buffer: Arc<dyn BoundedBuffer<i64>>,
    config: &DemoConfig,
    token: &CancellationToken,
) -> Result<RunReport, DriverError> {
    config.validate()?;
    let started = Instant::now();
    let run_token = token.child_token();

    // Disconnects when the run is cancelled; workers pause on it.
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    let watcher = {
        let buffer = Arc::clone(&buffer);
        let fired = run_token.clone();
        cancel::watch(&run_token, move || {
            drop(stop_tx);
            // Also runs when the watcher is dropped at the end of a clean run.
            if fired.is_cancelled() {
                buffer.cancel();
            }
        })?
    };

    let timer = match config.duration() {
        Some(limit) => Some(spawn_timer(limit, stop_rx.clone(), run_token.clone())?),
        None => None,
    };

    info!(
        strategy = %buffer.strategy(),
        capacity = buffer.capacity(),
        producers = config.producers,
        consumers = config.consumers,
        "starting run"
    );

    let mut producers = Vec::with_capacity(config.producers);
    for id in 0..config.producers {
        let worker = Producer {
            id,
            quota: config.iterations,
            values: config.values,
            ctx: WorkerCtx::new(&buffer, &stop_rx, &run_token, config.delay()),
        };
        producers.push(spawn(format!("producer-{id}"), &run_token, move || worker.run())?);
    }

    let mut consumers = Vec::with_capacity(config.consumers);
    for id in 0..config.consumers {
        let worker = Consumer {
            id,
            quota: config.consumer_quota(id),
            ctx: WorkerCtx::new(&buffer, &stop_rx, &run_token, config.delay()),
        };
        consumers.push(spawn(format!("consumer-{id}"), &run_token, move || worker.run())?);
    }
    drop(stop_rx);

    let mut produced = 0;
    for handle in producers {
        produced += join(handle)?;
    }
    let mut values = Vec::new();
    for handle in consumers {
        values.extend(join(handle)?);
    }

    let cancelled = run_token.is_cancelled();
    // Stops the timer too: it waits on the channel the watcher disconnects.
    drop(watcher);
    if let Some(timer) = timer {
        let _ = timer.join();
    }

    let report = RunReport {
        strategy: buffer.strategy(),
        capacity: buffer.capacity(),
        producers: config.producers,
        consumers: config.consumers,
        produced,
        consumed: values.len() as u64,
        cancelled,
        elapsed_ms: started.elapsed().as_millis() as u64,
        stats: buffer.stats(),
        values,
    };
    info!(
        produced = report.produced,
        consumed = report.consumed,
        cancelled = report.cancelled,
        "run finished"
    );
    Ok(report)
}

struct WorkerCtx {
    buffer: Arc<dyn BoundedBuffer<i64>>,
    stop: Receiver<()>,
    token: CancellationToken,
    delay: Duration,
}

impl WorkerCtx {
    fn new(
        buffer: &Arc<dyn BoundedBuffer<i64>>,
        stop: &Receiver<()>,
        token: &CancellationToken,
        delay: Duration,
    ) -> Self {
        Self {
            buffer: Arc::clone(buffer),
            stop: stop.clone(),
            token: token.clone(),
            delay,
        }
    }

    /// Simulated work. Returns `false` if the run was cancelled meanwhile.
    fn pause(&self) -> bool {
        if self.delay.is_zero() {
            return !self.token.is_cancelled();
        }
        matches!(
            self.stop.recv_timeout(self.delay),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

fn within(quota: Option<u64>, done: u64) -> bool {
    quota.map_or(true, |q| done < q)
}

struct Producer {
    id: usize,
    quota: Option<u64>,
    values: ValueSource,
    ctx: WorkerCtx,
}

impl Producer {
    fn run(self) -> Result<u64, DriverError> {
        let mut rng = rand::thread_rng();
        let mut produced = 0u64;

        while within(self.quota, produced) && !self.ctx.token.is_cancelled() {
            let value = match self.values {
                ValueSource::Random => rng.gen_range(0..100),
                ValueSource::Sequential => ((self.id as i64) << 32) | produced as i64,
            };

            match self.ctx.buffer.produce(value) {
                Ok(()) => {
                    produced += 1;
                    info!(value, "producing value");
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => return Err(e.into()),
            }

            if !self.ctx.pause() {
                break;
            }
        }

        info!(produced, "producer done");
        Ok(produced)
    }
}

struct Consumer {
    id: usize,
    quota: Option<u64>,
    ctx: WorkerCtx,
}

impl Consumer {
    fn run(self) -> Result<Vec<i64>, DriverError> {
        let mut seen = Vec::new();

        while within(self.quota, seen.len() as u64) {
            match self.ctx.buffer.consume() {
                Ok(value) => {
                    info!(value, "consuming value");
                    seen.push(value);
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => return Err(e.into()),
            }

            if !self.ctx.pause() {
                break;
            }
        }

        info!(id = self.id, consumed = seen.len(), "consumer done");
        Ok(seen)
    }
}

fn spawn<R, F>(
    name: String,
    token: &CancellationToken,
    work: F,
) -> Result<JoinHandle<Result<R, DriverError>>, DriverError>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R, DriverError> + Send + 'static,
{
    let token = token.clone();
    let handle = thread::Builder::new().name(name).spawn(move || {
        let result = work();
        if let Err(e) = &result {
            warn!(error = %e, "worker failed, cancelling run");
            token.cancel();
        }
        result
    })?;
    Ok(handle)
}

fn join<R>(handle: JoinHandle<Result<R, DriverError>>) -> Result<R, DriverError> {
    let name = handle.thread().name().unwrap_or("worker").to_string();
    handle
        .join()
        .map_err(|_| DriverError::WorkerPanicked(name))?
}

fn spawn_timer(
    limit: Duration,
    stop: Receiver<()>,
    token: CancellationToken,
) -> Result<JoinHandle<()>, DriverError> {
    let handle = thread::Builder::new()
        .name("run-timer".into())
        .spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = stop.recv_timeout(limit) {
                info!(?limit, "run duration reached");
                token.cancel();
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(strategy: Strategy) -> DemoConfig {
        DemoConfig {
            strategy,
            capacity: 2,
            producers: 2,
            consumers: 3,
            iterations: Some(40),
            delay_ms: 0,
            duration_ms: None,
            values: ValueSource::Sequential,
        }
    }

    #[test]
    fn test_bounded_run_moves_every_value() {
        for strategy in Strategy::ALL {
            let report = run(&quick(strategy), &CancellationToken::new()).unwrap();
            assert_eq!(report.produced, 80, "{strategy}");
            assert_eq!(report.consumed, 80, "{strategy}");
            assert!(!report.cancelled);
            assert_eq!(report.stats.produced, 80);
            assert!(report.stats.peak_len <= 2);

            let mut values = report.values.clone();
            values.sort();
            values.dedup();
            assert_eq!(values.len(), 80, "{strategy}: lost or duplicated value");
        }
    }

    #[test]
    fn test_random_values_stay_in_range() {
        let config = DemoConfig {
            values: ValueSource::Random,
            ..quick(Strategy::Monitor)
        };
        let report = run(&config, &CancellationToken::new()).unwrap();
        assert!(report.values.iter().all(|v| (0..100).contains(v)));
    }

    #[test]
    fn test_duration_cancels_unbounded_run() {
        let config = DemoConfig {
            iterations: None,
            delay_ms: 5,
            duration_ms: Some(100),
            ..quick(Strategy::LockCondition)
        };
        let started = Instant::now();
        let report = run(&config, &CancellationToken::new()).unwrap();

        assert!(report.cancelled);
        assert!(report.produced > 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_external_cancel_stops_slow_workers() {
        // One-second pauses like the demo default; cancellation must not
        // wait them out.
        let config = DemoConfig {
            iterations: None,
            delay_ms: 1_000,
            ..quick(Strategy::Channel)
        };
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };

        let started = Instant::now();
        let report = run(&config, &token).unwrap();
        canceller.join().unwrap();

        assert!(report.cancelled);
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawning() {
        let config = DemoConfig {
            consumers: 0,
            ..quick(Strategy::Monitor)
        };
        assert!(matches!(
            run(&config, &CancellationToken::new()),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_run_on_does_not_cancel_buffer_after_clean_finish() {
        let token = CancellationToken::new();
        let buffer = buffer::build::<i64>(Strategy::Monitor, 2, &token).unwrap();
        run_on(Arc::clone(&buffer), &quick(Strategy::Monitor), &token).unwrap();

        assert!(!buffer.is_cancelled());
        buffer.produce(1).unwrap();
        assert_eq!(buffer.consume(), Ok(1));
    }
}
