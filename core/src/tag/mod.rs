//! Readers of NDEF messages, one per tag platform.
//!
//! Memory tags (Type 2) are tried first, then tags exposing the NDEF application (Type 4).

pub mod type2;
pub mod type4;

use crate::nfc::{self, Handler};
use crate::Card;

/// Outcome of reading a tag for its NDEF message.
#[derive(Debug)]
pub enum NdefRead {
    /// The raw NDEF message.
    Message(Vec<u8>),

    /// The tag is not formatted for this platform, or carries nothing.
    NoMessage,

    /// Talking to the reader failed; no other platform should be tried.
    ConnectionError(nfc::Error),
}

impl NdefRead {
    /// Falls back to the other reader only when no message was found.
    pub fn or_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Self::NoMessage => f(),
            _ => self,
        }
    }

    /// Returns the message, if any.
    pub fn message(self) -> Option<Vec<u8>> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }
}

impl From<nfc::Error> for NdefRead {
    fn from(e: nfc::Error) -> Self {
        match e {
            nfc::Error::Status(_) => Self::NoMessage,
            _ => Self::ConnectionError(e),
        }
    }
}

impl From<Result<Vec<u8>, NdefRead>> for NdefRead {
    fn from(result: Result<Vec<u8>, NdefRead>) -> Self {
        match result {
            Ok(message) => Self::Message(message),
            Err(read) => read,
        }
    }
}

/// Reads the NDEF message of the tag, trying Type 2 before Type 4.
pub fn read_message<T>(card: &Card<T>) -> NdefRead
where
    T: Handler,
{
    type2::read(card).or_else(|| type4::read(card))
}
