//! Type 4 tags: the NDEF application with its capability container and NDEF files.

use crate::nfc::Handler;
use crate::tag::NdefRead;
use crate::tlv::Reader;
use crate::Card;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

const NDEF_AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];
const EF_CC: [u8; 2] = [0xE1, 0x03];
const EF_NDEF: [u8; 2] = [0xE1, 0x04];

const CC_LENGTH: u8 = 0x0F;
const NLEN_LENGTH: u8 = 2;

/// Largest Le of a short `READ BINARY`.
const MAX_SHORT_LE: u16 = 0xFF;

/// The fields of the capability container file this reader relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// MLe: the largest response the tag is able to send.
    pub max_read_size: u16,

    /// Size of the NDEF file, including its length prefix.
    pub max_ndef_size: u16,
}

impl Capabilities {
    /// Parses the capability container, `None` if it is too short.
    pub fn parse(cc: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(cc);
        reader.seek(3)?;
        let max_read_size = reader.read_u16()?;
        reader.seek(6)?;
        let max_ndef_size = reader.read_u16()?;

        Some(Self {
            max_read_size,
            max_ndef_size,
        })
    }
}

/// Reads the NDEF message from the NDEF file of the tag.
pub fn read<T>(card: &Card<T>) -> NdefRead
where
    T: Handler,
{
    debug!("Trying to read Type 4 NDEF tag");

    read_file(card).into()
}

fn read_file<T>(card: &Card<T>) -> Result<Vec<u8>, NdefRead>
where
    T: Handler,
{
    card.select_aid(&NDEF_AID)?;
    card.select_file(EF_CC)?;

    let cc = card.read_binary(0, CC_LENGTH)?;
    let capabilities = Capabilities::parse(&cc).ok_or_else(|| {
        warn!("Invalid capability container: {}", hex::encode(&cc));

        NdefRead::NoMessage
    })?;

    card.select_file(EF_NDEF)?;

    let nlen = card.read_binary(0, NLEN_LENGTH)?;
    let length = Reader::new(&nlen).read_u16().ok_or(NdefRead::NoMessage)?;
    if length as usize + NLEN_LENGTH as usize != capabilities.max_ndef_size as usize {
        warn!(
            "Payload length mismatch: {} + 2 != {}",
            length, capabilities.max_ndef_size,
        );
    }

    if length == 0 {
        debug!("NDEF file is empty");

        return Err(NdefRead::NoMessage);
    }

    let message = read_chunks(card, length as usize, capabilities.max_read_size)?;
    info!("Payload: {}", hex::encode(&message));

    Ok(message)
}

/// Reads the message in as many chunks as the tag needs, right after the length prefix.
fn read_chunks<T>(card: &Card<T>, length: usize, max_read_size: u16) -> Result<Vec<u8>, NdefRead>
where
    T: Handler,
{
    let chunk = max_read_size.min(MAX_SHORT_LE) as usize;
    if chunk == 0 {
        warn!("Tag declares a maximum response size of zero");

        return Err(NdefRead::NoMessage);
    }

    let mut message = Vec::with_capacity(length);
    while message.len() < length {
        let offset = u16::try_from(NLEN_LENGTH as usize + message.len())
            .map_err(|_| NdefRead::NoMessage)?;
        let le = (length - message.len()).min(chunk) as u8;

        let bytes = card.read_binary(offset, le)?;
        if bytes.is_empty() {
            warn!("Tag answered nothing at offset {}", offset);

            return Err(NdefRead::NoMessage);
        }

        message.extend(bytes);
    }

    message.truncate(length);

    Ok(message)
}
