//! # Bounded buffer, three ways
//!
//! A fixed-capacity FIFO with blocking `produce` / `consume`, implemented with
//! three synchronization strategies that satisfy the same [`BoundedBuffer`]
//! contract:
//!
//! | strategy | waiting | signalling |
//! |---|---|---|
//! | [`MonitorBuffer`] | one `Condvar` shared by everyone | `notify_all` to all waiters |
//! | [`ChannelBuffer`] | inside `crossbeam::channel::bounded` | handled by crossbeam |
//! | [`LockConditionBuffer`] | `not_full` / `not_empty` | `notify_all` on the opposite side only |
//!
//! Every blocking call can be abandoned through a `CancellationToken`, and has
//! a timed and a non-blocking sibling.
//!
//! ```no_run
//! use bounded_buffer::{build, BoundedBuffer, CancellationToken, Strategy};
//!
//! let token = CancellationToken::new();
//! let buffer = build::<i64>(Strategy::LockCondition, 5, &token).unwrap();
//! buffer.produce(1).unwrap();
//! assert_eq!(buffer.consume().unwrap(), 1);
//! token.cancel();
//! ```

pub mod buffer;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod harness;
pub mod lock_condition;
pub mod logging;
pub mod monitor;

mod cancel;
mod guarded;

pub use buffer::{build, BoundedBuffer, BufferStats, Strategy, DEFAULT_CAPACITY};
pub use channel::ChannelBuffer;
pub use config::{DemoConfig, ValueSource};
pub use driver::{run, run_on, RunReport};
pub use error::{BufferError, ConfigError, DriverError, HarnessError};
pub use lock_condition::LockConditionBuffer;
pub use monitor::MonitorBuffer;
pub use tokio_util::sync::CancellationToken;
