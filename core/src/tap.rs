//! A single tap: reading the UID and the URL of the tag presented to a reader.

use std::fmt::{Debug, Display, Formatter};

use crate::ndef::{self, DecodeError};
use crate::nfc::{self, Handler};
use crate::tag::{self, NdefRead};
use crate::terminal::{Connection, Terminal};
use crate::Card;

#[cfg(feature = "tracing")]
use tracing::{error, info, warn};

/// Lengths of single, double and triple size UIDs.
const UID_LENGTHS: [usize; 3] = [4, 7, 10];

/// Unique identifier of the tag, valid for the duration of a tap.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Uid(Vec<u8>);

impl Uid {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Upper-case hexadecimal form, as sent in URLs and webhooks.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl TryFrom<Vec<u8>> for Uid {
    type Error = TapError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        match UID_LENGTHS.contains(&bytes.len()) {
            true => Ok(Self(bytes)),
            _ => Err(TapError::NoUid),
        }
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uid({})", self.to_hex())
    }
}

/// What the reader reports about the field.
#[derive(Debug)]
pub enum Detected {
    Uid(Uid),

    /// Nothing a UID could be read from, such as a contact card or an unsupported chip.
    NoTag,
}

#[derive(Debug, thiserror::Error)]
pub enum TapError {
    #[error("No UID, unsupported reader and/or tag")]
    NoUid,

    #[error("Could not read: {0}")]
    Connection(#[from] nfc::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// The outcome of one read attempt on one reader.
#[derive(Debug)]
pub struct TapResult {
    reader: String,
    uid: Option<Uid>,
    url: Option<String>,
    error: Option<TapError>,
}

impl TapResult {
    /// A tap that yielded the UID, and the URL if the tag carried one.
    pub fn new(reader: impl Into<String>, uid: Uid, url: Option<String>) -> Self {
        Self {
            reader: reader.into(),
            uid: Some(uid),
            url,
            error: None,
        }
    }

    /// A tap whose message could not be understood; the UID is still usable.
    pub fn undecodable(reader: impl Into<String>, uid: Uid, error: DecodeError) -> Self {
        Self {
            reader: reader.into(),
            uid: Some(uid),
            url: None,
            error: Some(error.into()),
        }
    }

    /// A tap that yielded nothing usable.
    pub fn failed(reader: impl Into<String>, error: TapError) -> Self {
        Self {
            reader: reader.into(),
            uid: None,
            url: None,
            error: Some(error),
        }
    }

    pub fn reader(&self) -> &str {
        &self.reader
    }

    pub fn uid(&self) -> Option<&Uid> {
        self.uid.as_ref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn error(&self) -> Option<&TapError> {
        self.error.as_ref()
    }
}

impl Display for TapResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TapResult[reader={}", self.reader)?;
        if let Some(uid) = &self.uid {
            write!(f, ", uid={}", uid)?;
        }
        if let Some(url) = &self.url {
            write!(f, ", url={}", url)?;
        }
        if let Some(error) = &self.error {
            write!(f, ", error={}", error)?;
        }

        f.write_str("]")
    }
}

/// Reads the tag presented to the reader.
///
/// The connection is held exclusively while reading and is always disconnected afterwards,
/// whatever the outcome. Failures never escape: they are carried by the result.
pub fn read_tap<T>(reader: &str, terminal: &mut T) -> TapResult
where
    T: Terminal + ?Sized,
{
    let mut connection = match terminal.connect() {
        Ok(connection) => connection,
        Err(e) => {
            error!("Could not connect to {}: {}", reader, e);

            return TapResult::failed(reader, e.into());
        }
    };

    let result = connection.exclusive(|handler| read_tag(reader, &Card::new(handler)));

    if let Err(e) = connection.disconnect() {
        // the tag was already read, so only the log hears of it
        warn!("Could not disconnect from {}: {}", reader, e);
    }

    result.unwrap_or_else(|e| {
        error!("Could not get exclusive access to {}: {}", reader, e);

        TapResult::failed(reader, e.into())
    })
}

fn read_tag<T>(reader: &str, card: &Card<T>) -> TapResult
where
    T: Handler,
{
    let uid = match card.get_uid() {
        Ok(Detected::Uid(uid)) => uid,
        Ok(Detected::NoTag) => {
            info!("No UID, assuming not a supported contactless reader/device");

            return TapResult::failed(reader, TapError::NoUid);
        }
        Err(e) => {
            error!("Could not connect to or read: {}", e);

            return TapResult::failed(reader, e.into());
        }
    };

    match tag::read_message(card) {
        NdefRead::Message(message) => match ndef::message_to_url(&message) {
            Ok(url) => {
                info!("Read URL: {}", url);

                TapResult::new(reader, uid, Some(url))
            }
            Err(e) => {
                warn!("Could not decode {}: {}", hex::encode(&message), e);

                TapResult::undecodable(reader, uid, e)
            }
        },
        NdefRead::NoMessage => TapResult::new(reader, uid, None),
        NdefRead::ConnectionError(e) => {
            error!("Could not connect to or read: {}", e);

            TapResult::failed(reader, e.into())
        }
    }
}
