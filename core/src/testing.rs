//! In-memory tags for unit tests.

use std::cell::{Cell, RefCell};

use crate::nfc::{self, Command, Handler, Response};

type Respond = dyn Fn(&[u8]) -> (Vec<u8>, u16);

/// A card answering every command from a closure, recording what was sent.
pub(crate) struct ScriptedCard {
    respond: Option<Box<Respond>>,
    sent: RefCell<Vec<Vec<u8>>>,
}

impl ScriptedCard {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&[u8]) -> (Vec<u8>, u16) + 'static,
    {
        Self {
            respond: Some(Box::new(respond)),
            sent: RefCell::new(Vec::new()),
        }
    }

    /// A card whose reader fails on every command.
    pub(crate) fn failing() -> Self {
        Self {
            respond: None,
            sent: RefCell::new(Vec::new()),
        }
    }

    /// Answers GET UID with the UID, everything else as before.
    pub(crate) fn with_uid(self, uid: &[u8]) -> Self {
        let uid = uid.to_vec();

        match self.respond {
            Some(respond) => Self::new(move |apdu| match apdu {
                [0xFF, 0xCA, ..] => (uid.clone(), 0x9000),
                _ => respond(apdu),
            }),
            None => self,
        }
    }

    /// Every command frame received so far, in order.
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
}

impl Handler for ScriptedCard {
    fn handle(&self, command: Command) -> Result<Response, nfc::Error> {
        let apdu = Vec::from(command);
        self.sent.borrow_mut().push(apdu.clone());

        match &self.respond {
            Some(respond) => {
                let (payload, sw) = respond(&apdu);

                Ok(self::respond(payload, sw))
            }
            None => Err(nfc::Error::transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "reader was unplugged",
            ))),
        }
    }
}

/// A response carrying the payload followed by the status word.
pub(crate) fn respond(payload: Vec<u8>, sw: u16) -> Response {
    Response::from([payload, sw.to_be_bytes().to_vec()].concat())
}

/// A memory tag answering `page` octets to every block read.
/// Everything past the end of the memory reads as zeros.
pub(crate) fn type2_memory(memory: Vec<u8>, page: usize) -> ScriptedCard {
    ScriptedCard::new(move |apdu| match apdu {
        [0xFF, 0xB0, p1, p2, _] => {
            let offset = u16::from_be_bytes([*p1, *p2]) as usize * 4;
            let bytes = (offset..offset + page)
                .map(|i| memory.get(i).copied().unwrap_or_default())
                .collect();

            (bytes, 0x9000)
        }
        _ => (vec![], 0x6D00),
    })
}

/// A memory tag holding the message in a single NDEF message TLV.
pub(crate) fn type2_tag(message: &[u8]) -> ScriptedCard {
    let mut data = vec![0x03, message.len() as u8];
    data.extend_from_slice(message);
    data.push(0xFE);
    data.resize(data.len().div_ceil(8) * 8, 0x00);

    let mut memory = vec![0x00; 12];
    memory.extend([0xE1, 0x10, (data.len() / 8) as u8, 0x00]);
    memory.extend(data);

    type2_memory(memory, 4)
}

/// A tag exposing the NDEF application with the capability container and NDEF files.
pub(crate) fn type4_files(cc: Vec<u8>, ndef: Vec<u8>) -> ScriptedCard {
    const AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

    let selected = Cell::new(None::<[u8; 2]>);

    ScriptedCard::new(move |apdu| match apdu {
        [0x00, 0xA4, 0x04, 0x00, 0x07, aid @ .., 0x00] if aid == AID => (vec![], 0x9000),
        [0x00, 0xA4, 0x04, ..] => (vec![], 0x6A82),
        [0x00, 0xA4, 0x00, 0x0C, 0x02, a, b] => match [*a, *b] {
            id @ ([0xE1, 0x03] | [0xE1, 0x04]) => {
                selected.set(Some(id));

                (vec![], 0x9000)
            }
            _ => (vec![], 0x6A82),
        },
        [0x00, 0xB0, p1, p2, le] => {
            let file = match selected.get() {
                Some([0xE1, 0x03]) => &cc,
                Some(_) => &ndef,
                None => return (vec![], 0x6986),
            };
            let offset = u16::from_be_bytes([*p1, *p2]) as usize;
            let le = match *le {
                0 => 256,
                l => l as usize,
            };
            let end = file.len().min(offset + le);

            (file.get(offset..end).unwrap_or_default().to_vec(), 0x9000)
        }
        _ => (vec![], 0x6D00),
    })
}

/// A tag exposing the NDEF application, declaring the maximum R-APDU size `mle`.
pub(crate) fn type4_tag(message: &[u8], mle: u16) -> ScriptedCard {
    let nlen = message.len() as u16;
    let [mle_hi, mle_lo] = mle.to_be_bytes();
    let [max_hi, max_lo] = (nlen + 2).to_be_bytes();

    let cc = vec![
        0x00, 0x0F, 0x20, mle_hi, mle_lo, 0x00, 0x34, 0x04, 0x06, 0xE1, 0x04, max_hi, max_lo,
        0x00, 0xFF,
    ];

    let mut ndef = nlen.to_be_bytes().to_vec();
    ndef.extend_from_slice(message);

    type4_files(cc, ndef)
}
