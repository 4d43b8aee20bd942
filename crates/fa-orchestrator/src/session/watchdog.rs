//! Stuck-session watchdog
//!
//! A session whose pipeline goes quiet would otherwise sit in progress
//! forever. Each active session gets a watchdog that fires once after the
//! configured stage timeout, unless it is stopped first because the session
//! settled or was torn down.
//!
//! The callback receives the generation the watchdog was armed for, so a
//! late firing against a newer session is a no-op on the receiving side.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fa_core::Generation;

/// Handle to a running watchdog; dropping it stops the timer
#[derive(Debug)]
pub struct Watchdog {
    generation: Generation,
    cancel: CancellationToken,
}

impl Watchdog {
    /// Arm a watchdog that calls `on_expire` once `timeout` elapses
    pub fn spawn<F>(generation: Generation, timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce(Generation) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tracing::debug!(%generation, ?timeout, "Arming session watchdog");

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(%generation, ?timeout, "Session watchdog expired");
                    on_expire(generation);
                }
                _ = token.cancelled() => {
                    tracing::trace!(%generation, "Session watchdog stopped");
                }
            }
        });

        Self { generation, cancel }
    }

    /// Generation this watchdog guards
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Stop the timer; stopping twice is harmless
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the timer was stopped
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
