//! Type 2 tags: plain block memory behind the reader's `READ BINARY` pseudo-APDU.

use crate::nfc::Handler;
use crate::tag::NdefRead;
use crate::{tlv, Card};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

const CC_BLOCK: u16 = 3;
const FIRST_DATA_BLOCK: u16 = 4;
const BLOCK_SIZE: u8 = 4;
const CC_MAGIC: [u8; 2] = [0xE1, 0x10];

/// Reads the NDEF message stored in the data area of the tag.
pub fn read<T>(card: &Card<T>) -> NdefRead
where
    T: Handler,
{
    read_area(card)
        .and_then(|area| match tlv::find_ndef_message(&area) {
            Some([]) => {
                debug!("Empty NDEF message TLV");

                Err(NdefRead::NoMessage)
            }
            Some(message) => Ok(message.to_vec()),
            None => {
                debug!("No NDEF message TLV in {}", hex::encode(&area));

                Err(NdefRead::NoMessage)
            }
        })
        .into()
}

/// Reads the data area declared by the capability container.
/// Reading stops early at the first block of zeros.
pub fn read_area<T>(card: &Card<T>) -> Result<Vec<u8>, NdefRead>
where
    T: Handler,
{
    // Some readers answer a whole page of 16 octets even if asked for 4.
    let cc = card.read_blocks(CC_BLOCK, BLOCK_SIZE)?;
    if cc.len() < 4 || cc[..2] != CC_MAGIC {
        warn!("Invalid capability container: {}", hex::encode(&cc));

        return Err(NdefRead::NoMessage);
    }

    let total = cc[2] as usize * 8;
    debug!("NDEF area of {} bytes", total);

    let mut area = Vec::with_capacity(total);
    let mut block = FIRST_DATA_BLOCK;

    while area.len() < total {
        let bytes = card.read_blocks(block, BLOCK_SIZE)?;
        if bytes.iter().all(|b| *b == 0x00) {
            debug!("Empty block {}, not reading more", block);
            break;
        }

        block += (bytes.len() / BLOCK_SIZE as usize).max(1) as u16;
        area.extend(bytes);
    }

    area.truncate(total);

    Ok(area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfc::command;
    use crate::testing::{self, ScriptedCard};

    fn block_reads(script: &ScriptedCard) -> Vec<u16> {
        script
            .sent()
            .iter()
            .map(|apdu| u16::from_be_bytes([apdu[2], apdu[3]]))
            .collect()
    }

    #[test]
    fn test_stops_at_empty_block() {
        let mut memory = vec![0x00; 12];
        memory.extend([0xE1, 0x10, 0x06, 0x00]);
        memory.extend([0x03, 0x06, 0xD1, 0x01, 0x02, 0x55, 0x04, 0x61, 0xFE, 0x00, 0x00, 0x00]);
        memory.extend([0x00; 4]);
        memory.extend([0xAA; 32]);
        let script = testing::type2_memory(memory, 4);

        assert_eq!(
            Ok(vec![0x03, 0x06, 0xD1, 0x01, 0x02, 0x55, 0x04, 0x61, 0xFE, 0x00, 0x00, 0x00]),
            read_area(&Card::new(&script)).map_err(|_| ()),
        );
        assert_eq!(vec![3, 4, 5, 6, 7], block_reads(&script));
        assert_eq!(
            Vec::from(command::read_blocks(3, 4)),
            script.sent()[0],
        );
    }

    #[test]
    fn test_page_sized_answers() {
        let mut memory = vec![0x00; 12];
        memory.extend([0xE1, 0x10, 0x03, 0x00]);
        memory.extend([0x11; 48]);
        let script = testing::type2_memory(memory, 16);

        let area = read_area(&Card::new(&script)).map_err(|_| ()).unwrap();

        assert_eq!(24, area.len());
        assert_eq!(vec![3, 4, 8], block_reads(&script));
    }

    #[test]
    fn test_blocks_beyond_255() {
        let mut memory = vec![0x00; 12];
        memory.extend([0xE1, 0x10, 0xFF, 0x00]);
        memory.extend([0x22; 2040]);
        let script = testing::type2_memory(memory, 4);

        let area = read_area(&Card::new(&script)).map_err(|_| ()).unwrap();

        assert_eq!(2040, area.len());
        assert_eq!(Some(&513), block_reads(&script).last());
        assert!(script.sent().contains(&vec![0xFF, 0xB0, 0x01, 0x00, 0x04]));
    }

    #[test]
    fn test_invalid_capability_container() {
        let script = ScriptedCard::new(|_| (vec![0x00, 0x00, 0x00, 0x00], 0x9000));

        assert!(matches!(read(&Card::new(&script)), NdefRead::NoMessage));
        assert_eq!(1, script.sent().len());
    }

    #[test]
    fn test_status_error_while_reading() {
        let script = ScriptedCard::new(|apdu| match apdu[3] {
            3 => (vec![0xE1, 0x10, 0x06, 0x00], 0x9000),
            4 => (vec![0x03, 0x06, 0xD1, 0x01], 0x9000),
            _ => (vec![], 0x6300),
        });

        assert!(matches!(read(&Card::new(&script)), NdefRead::NoMessage));
    }

    #[test]
    fn test_message_after_lock_control() {
        let mut memory = vec![0x00; 12];
        memory.extend([0xE1, 0x10, 0x02, 0x00]);
        memory.extend([0x01, 0x03, 0xA0, 0x0C, 0x34, 0x03, 0x03, 0xD1, 0x01, 0x00, 0xFE]);
        let script = testing::type2_memory(memory, 4);

        assert_eq!(
            Some(vec![0xD1, 0x01, 0x00]),
            read(&Card::new(&script)).message(),
        );
    }

    #[test]
    fn test_factory_formatted_tag() {
        let mut memory = vec![0x00; 12];
        memory.extend([0xE1, 0x10, 0x12, 0x00]);
        memory.extend([0x03, 0x00, 0xFE, 0x00]);
        let script = testing::type2_memory(memory, 4);

        assert!(matches!(read(&Card::new(&script)), NdefRead::NoMessage));
    }

    #[test]
    fn test_single_tlv_tag() {
        let message = b"\xD1\x01\x0C\x55\x04example.org".to_vec();
        let script = testing::type2_tag(&message);

        assert_eq!(Some(message), read(&Card::new(&script)).message());
    }
}
