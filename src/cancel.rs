//! Bridges a `CancellationToken` to threads parked on a condvar or channel.
//!
//! A `Condvar` cannot wait on a token, so each buffer owns a watcher thread
//! that sleeps until the token fires and then runs a wake-up closure.

use std::thread::{self, JoinHandle};

use futures::executor::block_on;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::BufferError;

pub(crate) struct CancelWatcher {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Runs `on_cancel` on a dedicated thread once `token` (or any parent) is
/// cancelled, or when the returned watcher is dropped.
pub(crate) fn watch<F>(token: &CancellationToken, on_cancel: F) -> Result<CancelWatcher, BufferError>
where
    F: FnOnce() + Send + 'static,
{
    let stop = token.child_token();
    let fired = stop.clone();

    let handle = thread::Builder::new()
        .name("cancel-watcher".into())
        .spawn(move || {
            block_on(fired.cancelled());
            trace!("cancellation observed, waking waiters");
            on_cancel();
        })
        .map_err(|e| BufferError::Watcher(e.to_string()))?;

    Ok(CancelWatcher {
        stop,
        handle: Some(handle),
    })
}

impl Drop for CancelWatcher {
    fn drop(&mut self) {
        // Only the watcher's own child token; the caller's token is untouched.
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("cancel watcher panicked; blocked callers may not have been woken");
            }
        }
    }
}
