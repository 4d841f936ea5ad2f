//! Byte cursor and TLV support for tag memory images.

const TLV_NULL: u8 = 0x00;
const TLV_NDEF_MESSAGE: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;
const LENGTH_THREE_BYTES: u8 = 0xFF;

/// Stateful, simple and bounds-checked reader over a byte buffer.
/// Every read past the end yields `None` instead of panicking.
pub struct Reader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from the buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Reads data of specified size without seeking the cursor.
    pub fn peek(&self, length: usize) -> Option<&'a [u8]> {
        let end = self.cursor.checked_add(length)?;

        self.buffer.get(self.cursor..end)
    }

    /// Seeks the cursor without reading data.
    pub fn seek(&mut self, length: usize) -> Option<()> {
        self.read(length).map(|_| ())
    }

    /// Reads a next octet and seeks the cursor.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u8> {
        self.read(1).map(|b| b[0])
    }

    /// Reads data of specified size and seeks the cursor.
    /// Short version of `self.peek` + `self.seek`
    pub fn read(&mut self, length: usize) -> Option<&'a [u8]> {
        let bytes = self.peek(length)?;
        self.cursor += length;

        Some(bytes)
    }

    /// Reads a big-endian 16-bit word.
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian 32-bit word.
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads the length of a TLV in either the one or the three octet form.
    pub fn read_tlv_length(&mut self) -> Option<usize> {
        match self.next()? {
            LENGTH_THREE_BYTES => self.read_u16().map(usize::from),
            length => Some(length as usize),
        }
    }
}

/// Finds the first NDEF message TLV in the data area of a memory tag and returns its value.
///
/// NULL TLVs are skipped one octet at a time, lock control, memory control and
/// proprietary TLVs are skipped by their length, and the terminator ends the search.
pub fn find_ndef_message(area: &[u8]) -> Option<&[u8]> {
    let mut reader = Reader::new(area);

    loop {
        match reader.next()? {
            TLV_NULL => continue,
            TLV_TERMINATOR => return None,
            TLV_NDEF_MESSAGE => {
                let length = reader.read_tlv_length()?;

                return reader.read(length);
            }
            _ => {
                let length = reader.read_tlv_length()?;
                reader.seek(length)?;
            }
        }
    }
}
