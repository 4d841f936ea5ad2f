//! NDEF support: decoding well-known URI records into URLs.
//!
//! Only single-record messages carrying a well-known `U` record are understood.
//! Everything else is reported as a typed [`DecodeError`], never as a guessed URL.

use std::fmt::{Display, Formatter};

use crate::tlv::Reader;

const FLAG_SHORT_RECORD: u8 = 0x10;
const FLAG_ID_LENGTH: u8 = 0x08;
const TNF_MASK: u8 = 0x07;
const TNF_WELL_KNOWN: u8 = 0x01;

const RTD_URI: u8 = 0x55;
const RTD_SMART_POSTER: [u8; 2] = *b"Sp";

/// Header of a short, single, well-known record: MB, ME, SR and TNF=1.
const HEADER_SHORT_WELL_KNOWN: u8 = 0xD1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Smart Poster would not be supported by iPhone, ignoring")]
    SmartPoster,

    #[error("Unsupported NDEF message: type length is not 1")]
    UnsupportedMessage,

    #[error("Unsupported TNF")]
    UnsupportedTnf,

    #[error("Unknown URL record type: {0:#04X}")]
    UnknownPrefix(u8),

    #[error("NDEF message is truncated")]
    Truncated,

    #[error("URL record is not valid UTF-8")]
    InvalidText,
}

/// URI identifier codes of the well-known URI record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriPrefix {
    None = 0x00,
    HttpWww = 0x01,
    HttpsWww = 0x02,
    Http = 0x03,
    Https = 0x04,
}

impl UriPrefix {
    /// Every recognised prefix, longest expansion first.
    const BY_LENGTH: [UriPrefix; 4] = [Self::HttpsWww, Self::HttpWww, Self::Https, Self::Http];

    /// The text the code abbreviates.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::HttpWww => "http://www.",
            Self::HttpsWww => "https://www.",
            Self::Http => "http://",
            Self::Https => "https://",
        }
    }

    /// The one-octet code stored on the tag.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for UriPrefix {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::HttpWww),
            0x02 => Ok(Self::HttpsWww),
            0x03 => Ok(Self::Http),
            0x04 => Ok(Self::Https),
            _ => Err(DecodeError::UnknownPrefix(code)),
        }
    }
}

/// A decoded well-known URI record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    prefix: UriPrefix,
    rest: String,
}

impl UrlRecord {
    pub fn new(prefix: UriPrefix, rest: impl Into<String>) -> Self {
        Self {
            prefix,
            rest: rest.into(),
        }
    }

    /// Abbreviates the URL with the longest matching prefix code.
    pub fn from_url(url: &str) -> Self {
        UriPrefix::BY_LENGTH
            .iter()
            .find_map(|prefix| {
                url.strip_prefix(prefix.as_str())
                    .map(|rest| Self::new(*prefix, rest))
            })
            .unwrap_or_else(|| Self::new(UriPrefix::None, url))
    }

    pub fn prefix(&self) -> UriPrefix {
        self.prefix
    }

    /// The complete URL: expanded prefix followed by the stored text.
    pub fn to_url(&self) -> String {
        self.to_string()
    }

    /// Decodes a raw NDEF message consisting of one well-known URI record.
    pub fn decode(message: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(message);

        let header = reader.next().ok_or(DecodeError::Truncated)?;
        let type_length = reader.next().ok_or(DecodeError::Truncated)?;
        let short_record = header & FLAG_SHORT_RECORD == FLAG_SHORT_RECORD;

        let payload_length = match short_record {
            true => reader.next().map(usize::from),
            _ => reader.read_u32().map(|l| l as usize),
        }
        .ok_or(DecodeError::Truncated)?;

        let id_length = match header & FLAG_ID_LENGTH {
            0 => 0,
            _ => reader.next().ok_or(DecodeError::Truncated)? as usize,
        };

        // Give a helpful message when using smart posters
        if type_length == 2 && reader.peek(2) == Some(&RTD_SMART_POSTER[..]) {
            return Err(DecodeError::SmartPoster);
        }

        if type_length != 1 {
            return Err(DecodeError::UnsupportedMessage);
        }

        let record_type = reader.next().ok_or(DecodeError::Truncated)?;
        if record_type != RTD_URI || header & TNF_MASK != TNF_WELL_KNOWN {
            return Err(DecodeError::UnsupportedTnf);
        }

        reader.seek(id_length).ok_or(DecodeError::Truncated)?;

        let payload = reader.read(payload_length).ok_or(DecodeError::Truncated)?;
        let (code, rest) = payload.split_first().ok_or(DecodeError::Truncated)?;
        let prefix = UriPrefix::try_from(*code)?;
        let rest = String::from_utf8(rest.to_vec()).map_err(|_| DecodeError::InvalidText)?;

        Ok(Self::new(prefix, rest))
    }

    /// Encodes the record as a short, single-record NDEF message.
    /// Texts longer than a short record can hold use the standard 4-octet length.
    pub fn encode(&self) -> Vec<u8> {
        let rest = self.rest.as_bytes();
        let payload_length = rest.len() + 1;

        let mut message = Vec::with_capacity(payload_length + 7);
        match u8::try_from(payload_length) {
            Ok(length) => {
                message.extend([HEADER_SHORT_WELL_KNOWN, 0x01, length]);
            }
            Err(_) => {
                message.extend([HEADER_SHORT_WELL_KNOWN & !FLAG_SHORT_RECORD, 0x01]);
                message.extend((payload_length as u32).to_be_bytes());
            }
        }
        message.push(RTD_URI);
        message.push(self.prefix.code());
        message.extend_from_slice(rest);

        message
    }
}

impl Display for UrlRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix.as_str(), self.rest)
    }
}

/// Extracts the single URL of a raw NDEF message.
pub fn message_to_url(message: &[u8]) -> Result<String, DecodeError> {
    UrlRecord::decode(message).map(|record| record.to_url())
}
