//! PC/SC support for nfc4pc library.
//! Can be enabled by turning `pcsc` feature on.
//!
//! ## What is PC/SC?
//! PC/SC (Personal Computer/Smart Card) is an abstraction layer for communicating with Smart Cards
//! and contactless tags through readers attached to a PC. Windows and macOS supports PC/SC by
//! themselves, Linux also supports by installing pcsc-lite shared library.
//!
//! ## Supported platform
//! Linux, Windows and macOS are supported by pcsc-rust, backend of this implementation.
//! Refer the documentation of pcsc-rust for details:
//! <https://github.com/bluetech/pcsc-rust>
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nfc4pc::dispatch::{Action, Dispatcher, SinkError};
//! use nfc4pc::pcsc::{PcscReaders, PcscTerminals};
//! use nfc4pc::{Lanes, Monitor, RuntimeConfig};
//!
//! let sink = |action: Action| -> Result<(), SinkError> {
//!     println!("{:?}", action);
//!     Ok(())
//! };
//! let dispatcher = Arc::new(Dispatcher::new(RuntimeConfig::default(), sink));
//! let lanes = Lanes::new(PcscTerminals::try_new().unwrap());
//!
//! let monitor = Monitor::new()
//!     .spawn(
//!         PcscReaders::try_new().unwrap(),
//!         move |reader| lanes.schedule_tap(reader, Arc::clone(&dispatcher)).unwrap(),
//!         |e| eprintln!("{}", e),
//!     )
//!     .unwrap();
//!
//! monitor.join().unwrap();
//! ```

use std::ffi::CString;
use std::time::Duration;

use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};
use pcsc::{MAX_BUFFER_SIZE, PNP_NOTIFICATION};

use crate::monitor::{MonitorError, ReaderSource, ReaderStatus};
use crate::nfc::{self, Command, Handler, Response};
use crate::terminal::{Connection, Terminal, TerminalFactory};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// How long a poll waits for a change before reporting the states again.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Invalid reader name: {0}")]
    InvalidReaderName(String),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

fn establish() -> Result<Context> {
    Context::establish(Scope::User).map_err(Error::PcscError)
}

/// Lists the readers and their states on the PC/SC service.
pub struct PcscReaders {
    ctx: Context,
    states: Vec<ReaderState>,
    timeout: Duration,
}

impl PcscReaders {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: establish()?,
            states: vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)],
            timeout: POLL_TIMEOUT,
        })
    }

    /// Sets how long a poll blocks when nothing changes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn refresh_readers(&mut self) -> std::result::Result<(), pcsc::Error> {
        let readers = match self.ctx.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(e) => return Err(e),
        };

        self.states.retain(|state| {
            state.name() == PNP_NOTIFICATION() || readers.iter().any(|r| r.as_c_str() == state.name())
        });

        for reader in readers {
            if !self.states.iter().any(|state| state.name() == reader.as_c_str()) {
                debug!("Found reader: {}", reader.to_string_lossy());
                self.states.push(ReaderState::new(reader, State::UNAWARE));
            }
        }

        Ok(())
    }

    fn wait(&mut self) -> std::result::Result<(), pcsc::Error> {
        self.refresh_readers()?;

        for state in &mut self.states {
            state.sync_current_state();
        }

        match self.ctx.get_status_change(Some(self.timeout), &mut self.states) {
            Ok(()) | Err(pcsc::Error::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl ReaderSource for PcscReaders {
    fn poll(&mut self) -> std::result::Result<Vec<ReaderStatus>, MonitorError> {
        if let Err(e) = self.wait() {
            if matches!(
                e,
                pcsc::Error::InvalidHandle | pcsc::Error::ServiceStopped | pcsc::Error::NoService
            ) {
                warn!("PC/SC service went away, establishing a new context");

                if let Ok(ctx) = establish() {
                    self.ctx = ctx;
                    self.states.truncate(1);
                }
            }

            return Err(MonitorError::enumeration(e));
        }

        Ok(self
            .states
            .iter()
            .filter(|state| state.name() != PNP_NOTIFICATION())
            .map(|state| {
                let event = state.event_state();

                ReaderStatus {
                    name: state.name().to_string_lossy().into_owned(),
                    present: event.contains(State::PRESENT),
                    exclusive: event.contains(State::EXCLUSIVE),
                }
            })
            .collect())
    }
}

/// Opens PC/SC readers by name.
pub struct PcscTerminals {
    ctx: Context,
}

impl PcscTerminals {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self { ctx: establish()? })
    }
}

impl TerminalFactory for PcscTerminals {
    type Terminal = PcscTerminal;

    fn open(&self, reader: &str) -> std::result::Result<Self::Terminal, nfc::Error> {
        debug!("Using device: {}", reader);

        let reader = CString::new(reader)
            .map_err(|_| nfc::Error::transport(Error::InvalidReaderName(reader.to_string())))?;

        Ok(PcscTerminal {
            ctx: self.ctx.clone(),
            reader,
        })
    }
}

/// PC/SC device handle.
pub struct PcscTerminal {
    ctx: Context,
    reader: CString,
}

impl Terminal for PcscTerminal {
    type Connection = PcscConnection;

    fn connect(&mut self) -> std::result::Result<Self::Connection, nfc::Error> {
        let card = self
            .ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| nfc::Error::transport(Error::PcscError(e)))?;

        info!("Connected to the tag on {}", self.reader.to_string_lossy());

        Ok(PcscConnection { card })
    }
}

/// A tag to be communicated through PC/SC.
pub struct PcscConnection {
    card: Card,
}

impl Handler for PcscConnection {
    fn handle(&self, command: Command) -> std::result::Result<Response, nfc::Error> {
        transmit(&self.card, &Vec::from(command)).map(Response::from)
    }
}

impl Connection for PcscConnection {
    fn exclusive<R, F>(&mut self, f: F) -> std::result::Result<R, nfc::Error>
    where
        F: FnOnce(&dyn Handler) -> R,
    {
        let transaction = self
            .card
            .transaction()
            .map_err(|e| nfc::Error::transport(Error::PcscError(e)))?;

        Ok(f(&Locked(&*transaction)))
    }

    fn disconnect(self) -> std::result::Result<(), nfc::Error> {
        self.card
            .disconnect(Disposition::ResetCard)
            .map_err(|(_, e)| nfc::Error::transport(Error::PcscError(e)))
    }
}

/// The tag while a transaction holds it.
struct Locked<'a>(&'a Card);

impl<'a> Handler for Locked<'a> {
    fn handle(&self, command: Command) -> std::result::Result<Response, nfc::Error> {
        transmit(self.0, &Vec::from(command)).map(Response::from)
    }
}

/// Transmits an APDU command to the tag, then receives a response from them.
fn transmit(card: &Card, tx: &[u8]) -> std::result::Result<Vec<u8>, nfc::Error> {
    debug!("TX: {}", hex::encode(tx));

    let mut rx = [0u8; MAX_BUFFER_SIZE];
    let rx = card
        .transmit(tx, &mut rx)
        .map_err(|e| nfc::Error::transport(Error::PcscError(e)))?;

    debug!("RX: {}", hex::encode(rx));

    Ok(Vec::from(rx))
}
