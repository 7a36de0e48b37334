//! Wrapper for operations whose failure must never affect the job.
//!
//! Stale-process kills, stale-file deletion, config persistence after a
//! discovery, artifact cleanup and analytics all go through [`BestEffort`].
//! Failures are logged at `warn` and then dropped; nothing here returns an
//! error to the caller, and [`BestEffort::spawn`] never makes the caller wait.

use std::fmt::Display;
use std::future::Future;
use tokio::task::JoinHandle;

/// Marker namespace for non-critical operations.
pub struct BestEffort;

impl BestEffort {
    /// Log a failed result and discard it, returning the value on success.
    pub fn log<T, E: Display>(operation: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{} failed (ignored): {}", operation, e);
                None
            }
        }
    }

    /// Like [`log`](Self::log) but at `debug` level, for failures that are expected
    /// in the common case (e.g. no stale process to kill).
    pub fn quiet<T, E: Display>(operation: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("{} failed (ignored): {}", operation, e);
                None
            }
        }
    }

    /// Detach `future` onto the runtime. Its failure is logged, never propagated.
    ///
    /// The returned handle may be awaited (e.g. before process exit) or dropped;
    /// awaiting it never yields the operation's error.
    pub fn spawn<F, T, E>(operation: &'static str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        tokio::spawn(async move {
            Self::log(operation, future.await);
        })
    }

    /// Run blocking work (e.g. a synchronous HTTP call) off the async workers.
    pub fn spawn_blocking<F, T, E>(operation: &'static str, work: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            Self::log(operation, work());
        })
    }
}
