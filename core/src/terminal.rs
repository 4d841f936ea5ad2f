//! The card transport consumed by the read job.
//!
//! A [`TerminalFactory`] opens one [`Terminal`] per reader name. The terminal is owned by the
//! reader's lane and reused across taps; every tap makes a fresh [`Connection`] through it.

use crate::nfc::{self, Handler};

/// An open connection to the tag in the field of a reader.
pub trait Connection: Handler {
    /// Runs the closure while holding exclusive access to the tag.
    /// Access is released when the closure returns.
    fn exclusive<R, F>(&mut self, f: F) -> Result<R, nfc::Error>
    where
        F: FnOnce(&dyn Handler) -> R;

    /// Disconnects from the tag, resetting it.
    fn disconnect(self) -> Result<(), nfc::Error>;
}

/// A handle to one physical reader.
pub trait Terminal {
    type Connection: Connection;

    /// Connects to the tag in the field, shared and with any protocol.
    fn connect(&mut self) -> Result<Self::Connection, nfc::Error>;
}

/// Opens terminals by reader name.
pub trait TerminalFactory: Send + Sync + 'static {
    type Terminal: Terminal;

    fn open(&self, reader: &str) -> Result<Self::Terminal, nfc::Error>;
}
