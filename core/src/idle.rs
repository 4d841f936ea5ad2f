//! Idle timeout of the single-shot mode.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

#[cfg(feature = "tracing")]
use tracing::debug;

/// Calls back once if it is not cancelled within the timeout.
/// Dropping the timer cancels it.
pub struct IdleTimer {
    cancel: Sender<()>,
    thread: JoinHandle<bool>,
}

/// Cancels an [`IdleTimer`] from another thread.
#[derive(Clone)]
pub struct Canceller(Sender<()>);

impl Canceller {
    pub fn cancel(&self) {
        let _ = self.0.try_send(());
    }
}

impl IdleTimer {
    pub fn start<F>(timeout: Duration, on_idle: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, cancelled) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("idle timer".to_string())
            .spawn(move || match cancelled.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    debug!("No tap within {:?}", timeout);
                    on_idle();

                    true
                }
                _ => false,
            })?;

        Ok(Self { cancel, thread })
    }

    pub fn cancel(&self) {
        let _ = self.cancel.try_send(());
    }

    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancel.clone())
    }

    /// Waits for the timer to expire or be cancelled, returning whether it expired.
    pub fn wait(self) -> bool {
        let Self { cancel, thread } = self;
        let expired = thread.join().unwrap_or(false);
        drop(cancel);

        expired
    }
}
