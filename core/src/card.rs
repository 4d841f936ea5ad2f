use crate::nfc::{self, command, Command, Handler};
use crate::tap::{Detected, Uid};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

/// An adapter to communicate with the tag through the delegate
pub struct Card<T>
where
    T: Handler,
{
    delegate: T,
}

impl<T> Card<T>
where
    T: Handler,
{
    /// Initiates an adapter with the delegate.
    pub fn new(delegate: T) -> Self {
        Self { delegate }
    }

    /// Asks the reader for the UID of the tag in the field.
    /// A refused command or a UID of unusual length means there is no supported tag.
    pub fn get_uid(&self) -> Result<Detected, nfc::Error> {
        let bytes = match self.handle(command::get_uid()) {
            Ok(bytes) => bytes,
            Err(e) if e.is_status() => {
                debug!("GET UID was refused: {}", e);

                return Ok(Detected::NoTag);
            }
            Err(e) => return Err(e),
        };

        Ok(match Uid::try_from(bytes) {
            Ok(uid) => {
                info!("UID: {}", uid);

                Detected::Uid(uid)
            }
            _ => Detected::NoTag,
        })
    }

    /// Reads `le` octets of a memory tag starting from the block.
    pub fn read_blocks(&self, block: u16, le: u8) -> Result<Vec<u8>, nfc::Error> {
        self.handle(command::read_blocks(block, le))
    }

    /// Selects an application with their name, returning the FCI if any.
    pub fn select_aid(&self, aid: &[u8]) -> Result<Vec<u8>, nfc::Error> {
        self.handle(command::select_aid(aid.to_vec()))
    }

    /// Selects an EF with their identifier.
    pub fn select_file(&self, id: [u8; 2]) -> Result<(), nfc::Error> {
        self.handle(command::select_file(id)).map(|_| ())
    }

    /// Reads binary from the selected file for `le` octets max.
    pub fn read_binary(&self, offset: u16, le: u8) -> Result<Vec<u8>, nfc::Error> {
        self.handle(command::read_binary(offset, le))
    }

    fn handle(&self, command: Command) -> Result<Vec<u8>, nfc::Error> {
        Result::from(self.delegate.handle(command)?).map_err(|e| nfc::Error::Status(e.into()))
    }
}
