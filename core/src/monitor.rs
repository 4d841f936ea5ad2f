//! Watching readers for tags being presented.
//!
//! A [`ReaderSource`] reports the presence flag of every reader; the [`Monitor`] keeps the last
//! known flag per reader and turns rising edges into reads. The first observation of a reader
//! never triggers a read, so tags lying on a reader at startup are left alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{debug, error};

/// Delay before polling again after the source failed.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// State of one reader as reported by a single poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderStatus {
    pub name: String,

    /// A tag or card is in the field.
    pub present: bool,

    /// Another process holds the reader exclusively.
    pub exclusive: bool,
}

impl ReaderStatus {
    pub fn new(name: impl Into<String>, present: bool) -> Self {
        Self {
            name: name.into(),
            present,
            exclusive: false,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Could not list readers: {0}")]
    Enumeration(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MonitorError {
    pub fn enumeration<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Enumeration(Box::new(e))
    }
}

/// Enumerates readers with their presence flags.
pub trait ReaderSource: Send + 'static {
    /// Blocks until the reader list or the state of a reader changes, or a timeout elapses,
    /// then returns the state of every reader.
    fn poll(&mut self) -> Result<Vec<ReaderStatus>, MonitorError>;
}

/// Edge detection over successive polls.
#[derive(Debug, Default)]
pub struct Monitor {
    states: HashMap<String, bool>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates one poll, returning the readers a tag was freshly presented to, in poll order.
    pub fn observe(&mut self, readers: &[ReaderStatus]) -> Vec<String> {
        let mut fresh = Vec::new();

        for reader in readers {
            if reader.exclusive {
                debug!("Ignoring exclusively in use reader \"{}\"", reader.name);
                continue;
            }

            match self.states.get(&reader.name) {
                Some(false) if reader.present => {
                    debug!("Detected change in reader \"{}\"", reader.name);
                    fresh.push(reader.name.clone());
                }
                None if reader.present => {
                    debug!("Ignoring tag already present in \"{}\"", reader.name);
                }
                _ => {}
            }

            self.states.insert(reader.name.clone(), reader.present);
        }

        fresh
    }

    /// Last known presence flag of the reader.
    pub fn is_present(&self, reader: &str) -> Option<bool> {
        self.states.get(reader).copied()
    }

    /// Runs the monitor on a background thread, calling `on_tap` with the reader name of every
    /// fresh presentation and `on_error` for every failed poll.
    pub fn spawn<S, T, E>(
        mut self,
        mut source: S,
        mut on_tap: T,
        mut on_error: E,
    ) -> std::io::Result<MonitorHandle>
    where
        S: ReaderSource,
        T: FnMut(&str) + Send + 'static,
        E: FnMut(&MonitorError) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = Arc::clone(&running);

            thread::Builder::new()
                .name("PC/SC monitor".to_string())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        match source.poll() {
                            Ok(readers) => {
                                if !running.load(Ordering::Acquire) {
                                    break;
                                }

                                for reader in self.observe(&readers) {
                                    on_tap(&reader);
                                }
                            }
                            Err(e) => {
                                error!("PC/SC error: {}", e);
                                on_error(&e);
                                thread::sleep(RETRY_DELAY);
                            }
                        }
                    }

                    debug!("Monitor stopped");
                })?
        };

        Ok(MonitorHandle { running, thread })
    }
}

/// Handle of a monitor running in the background.
pub struct MonitorHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl MonitorHandle {
    /// Asks the monitor to stop once the current poll returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Waits for the monitor thread to exit.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}
