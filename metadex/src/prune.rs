//! Background prune task.
//!
//! A dedicated thread runs a callback on a fixed interval until it is told
//! to stop. Stopping is deterministic: [`PruneTask::stop`] signals the
//! thread over a channel and joins it, so no tick runs after it returns.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{MetadexError, Result};

/// Handle to a running periodic task.
#[derive(Debug)]
pub struct PruneTask {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PruneTask {
    /// Starts a thread calling `tick` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadexError::PruneTask`] if the thread cannot be spawned.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("metadex-prune".to_string())
            .spawn(move || {
                tracing::debug!(?interval, "prune task started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tick(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("prune task stopped");
            })
            .map_err(MetadexError::PruneTask)?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Returns true until [`stop`](Self::stop) has been called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the task and waits for the thread to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("prune task panicked");
        }
    }
}

impl Drop for PruneTask {
    fn drop(&mut self) {
        self.stop();
    }
}
