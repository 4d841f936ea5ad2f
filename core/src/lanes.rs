//! One sequential lane per reader.
//!
//! Jobs for the same reader run one after another on a thread named after the reader, so a
//! physical reader never sees two transactions at once. Different readers run in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{SendError, Sender};
use parking_lot::Mutex;

use crate::dispatch::{ActionSink, Dispatcher};
use crate::nfc;
use crate::tap::read_tap;
use crate::terminal::{Terminal, TerminalFactory};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

type Job<F> = Box<dyn FnOnce(&mut CachedTerminal<F>) + Send>;

/// The terminal of a lane, opened on first use and kept for later taps.
pub struct CachedTerminal<F>
where
    F: TerminalFactory,
{
    factory: Arc<F>,
    reader: String,
    terminal: Option<F::Terminal>,
}

impl<F> CachedTerminal<F>
where
    F: TerminalFactory,
{
    fn new(factory: Arc<F>, reader: String) -> Self {
        Self {
            factory,
            reader,
            terminal: None,
        }
    }

    pub fn reader(&self) -> &str {
        &self.reader
    }

    pub fn is_open(&self) -> bool {
        self.terminal.is_some()
    }
}

impl<F> Terminal for CachedTerminal<F>
where
    F: TerminalFactory,
{
    type Connection = <F::Terminal as Terminal>::Connection;

    fn connect(&mut self) -> Result<Self::Connection, nfc::Error> {
        let terminal = match self.terminal.take() {
            Some(terminal) => terminal,
            _ => {
                debug!("Opening terminal {}", self.reader);

                self.factory.open(&self.reader)?
            }
        };

        self.terminal.insert(terminal).connect()
    }
}

/// The lanes, created lazily by reader name and kept for the process lifetime.
pub struct Lanes<F>
where
    F: TerminalFactory,
{
    factory: Arc<F>,
    lanes: Mutex<HashMap<String, Sender<Job<F>>>>,
}

impl<F> Lanes<F>
where
    F: TerminalFactory,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueues the job on the lane of the reader, creating the lane on first use.
    pub fn schedule<J>(&self, reader: &str, job: J) -> std::io::Result<()>
    where
        J: FnOnce(&mut CachedTerminal<F>) + Send + 'static,
    {
        let mut lanes = self.lanes.lock();
        let mut job: Job<F> = Box::new(job);

        if let Some(lane) = lanes.get(reader) {
            match lane.send(job) {
                Ok(()) => return Ok(()),
                Err(SendError(returned)) => {
                    warn!("Lane of {} is gone, starting it again", reader);
                    job = returned;
                }
            }
        }

        let lane = self.spawn(reader)?;
        lane.send(job).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "lane exited on start")
        })?;
        lanes.insert(reader.to_string(), lane);

        Ok(())
    }

    /// Reads the tag on the lane of the reader, then dispatches the result from there.
    pub fn schedule_tap<S>(&self, reader: &str, dispatcher: Arc<Dispatcher<S>>) -> std::io::Result<()>
    where
        S: ActionSink,
    {
        self.schedule(reader, move |terminal| {
            let reader = terminal.reader().to_string();
            let result = read_tap(&reader, terminal);

            dispatcher.dispatch(result);
        })
    }

    /// Names of the readers a lane exists for.
    pub fn readers(&self) -> Vec<String> {
        let mut readers: Vec<String> = self.lanes.lock().keys().cloned().collect();
        readers.sort();
        readers
    }

    fn spawn(&self, reader: &str) -> std::io::Result<Sender<Job<F>>> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job<F>>();
        let factory = Arc::clone(&self.factory);
        let name = reader.to_string();

        thread::Builder::new().name(name.clone()).spawn(move || {
            let mut terminal = CachedTerminal::new(factory, name);

            for job in receiver {
                job(&mut terminal);
            }

            debug!("Lane of {} stopped", terminal.reader());
        })?;

        Ok(sender)
    }
}
