//! The commands a tag is read with.

use apdu::{command, Command};

const CLA_DEFAULT: u8 = 0x00;

/// CLA of pseudo-APDUs interpreted by the PC/SC reader on behalf of the tag.
const CLA_READER: u8 = 0xFF;

const INS_SELECT_FILE: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_GET_DATA: u8 = 0xCA;

const SELECT_P1_NAME: u8 = 0x04;
const SELECT_P1_ID: u8 = 0x00;
const SELECT_P2_FCI: u8 = 0x00;
const SELECT_P2_NONE: u8 = 0x0C;

/// The reader's `GET DATA` asking for the UID of the tag.
pub fn get_uid() -> Command {
    Command::new_with_le(CLA_READER, INS_GET_DATA, 0x00, 0x00, 0x00)
}

/// The reader's `READ BINARY` for memory tags, addressed by block.
pub fn read_blocks(block: u16, le: u8) -> Command {
    let [p1, p2] = block.to_be_bytes();

    Command::new_with_le(CLA_READER, INS_READ_BINARY, p1, p2, le.into())
}

/// `SELECT` by application name, expecting FCI back.
pub fn select_aid(aid: Vec<u8>) -> Command {
    Command::new_with_payload_le(CLA_DEFAULT, INS_SELECT_FILE, SELECT_P1_NAME, SELECT_P2_FCI, 0, aid)
}

/// `SELECT` by file identifier, without response data.
pub fn select_file(id: [u8; 2]) -> Command {
    command::select_file(SELECT_P1_ID, SELECT_P2_NONE, id.into()).into()
}

/// `READ BINARY` on the selected file at the offset.
pub fn read_binary(offset: u16, le: u8) -> Command {
    let [p1, p2] = offset.to_be_bytes();

    command::read_binary(p1, p2, le).into()
}
