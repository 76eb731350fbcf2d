use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single buffer operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("invalid capacity {0}: a bounded buffer needs room for at least one value")]
    InvalidCapacity(usize),

    #[error("blocking call was cancelled")]
    Cancelled,

    #[error("gave up after waiting {0:?}")]
    Timeout(Duration),

    #[error("buffer is full")]
    Full,

    #[error("buffer is empty")]
    Empty,

    #[error("failed to start cancellation watcher: {0}")]
    Watcher(String),
}

impl BufferError {
    /// Cancellation is the expected way for a worker loop to stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BufferError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("worker '{0}' panicked")]
    WorkerPanicked(String),
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("no progress within {window:?} (stuck at {progress} operations)")]
    Stalled { window: Duration, progress: u64 },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            BufferError::InvalidCapacity(0).to_string(),
            "invalid capacity 0: a bounded buffer needs room for at least one value"
        );
        assert_eq!(
            ConfigError::invalid("capacity", "must be at least 1").to_string(),
            "invalid value for 'capacity': must be at least 1"
        );
    }

    #[test]
    fn test_driver_error_wraps_buffer_error() {
        let err: DriverError = BufferError::Cancelled.into();
        assert_eq!(err.to_string(), "blocking call was cancelled");
        assert!(matches!(err, DriverError::Buffer(e) if e.is_cancelled()));
    }
}
