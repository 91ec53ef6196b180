//! Binary codec: little-endian integers, variable-length integers, hex text
//!
//! Every integer here is unsigned. A value that does not fit the requested
//! width is a caller bug, so writers take exactly-typed arguments.

use crate::error::{BetError, Result};
use crate::types::ByteString;

/// Marker bytes of the variable-length integer encoding
const VARINT_U16_MARKER: u8 = 0xfd;
const VARINT_U32_MARKER: u8 = 0xfe;
const VARINT_U64_MARKER: u8 = 0xff;

pub fn write_u16(buf: &mut ByteString, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u32(buf: &mut ByteString, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64(buf: &mut ByteString, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// VarInt: value < 0xfd → 1 byte; ≤ 0xffff → 0xfd + u16;
/// ≤ 0xffffffff → 0xfe + u32; otherwise 0xff + u64
pub fn write_varint(buf: &mut ByteString, value: u64) {
    if value < VARINT_U16_MARKER as u64 {
        buf.push(value as u8);
    } else if value <= u16::MAX as u64 {
        buf.push(VARINT_U16_MARKER);
        write_u16(buf, value as u16);
    } else if value <= u32::MAX as u64 {
        buf.push(VARINT_U32_MARKER);
        write_u32(buf, value as u32);
    } else {
        buf.push(VARINT_U64_MARKER);
        write_u64(buf, value);
    }
}

/// Number of bytes `write_varint` emits for `value`
pub fn varint_size(value: u64) -> usize {
    if value < VARINT_U16_MARKER as u64 {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Write a varint length prefix followed by the bytes
pub fn write_var_bytes(buf: &mut ByteString, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

pub fn varint_to_bytes(value: u64) -> ByteString {
    let mut buf = Vec::with_capacity(varint_size(value));
    write_varint(&mut buf, value);
    buf
}

/// Reversed copy of `bytes`
pub fn reversed(bytes: &[u8]) -> ByteString {
    bytes.iter().rev().copied().collect()
}

/// Uppercase hex text
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Parse hex text in either case
pub fn from_hex(text: &str) -> Result<ByteString> {
    if text.len() % 2 != 0 {
        return Err(BetError::malformed(format!(
            "hex string has odd length {}",
            text.len()
        )));
    }
    hex::decode(text).map_err(|e| BetError::malformed(format!("invalid hex: {e}")))
}

/// Parse hex text into a fixed-size array
pub fn from_hex_array<const N: usize>(text: &str) -> Result<[u8; N]> {
    let bytes = from_hex(text)?;
    to_array(&bytes)
}

/// Copy a slice into a fixed-size array, rejecting any other length
pub fn to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        BetError::malformed(format!("expected {} bytes, got {}", N, bytes.len()))
    })
}

/// Cursor over a byte slice. Every read fails with `MalformedInput` once the
/// data runs out.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(BetError::malformed(format!(
                "unexpected end of data: wanted {} bytes at offset {}, {} left",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        to_array(self.read_bytes(N)?)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        match self.read_u8()? {
            VARINT_U16_MARKER => Ok(self.read_u16()? as u64),
            VARINT_U32_MARKER => Ok(self.read_u32()? as u64),
            VARINT_U64_MARKER => self.read_u64(),
            small => Ok(small as u64),
        }
    }

    /// Varint used as a length or count; must fit the remaining data
    pub fn read_length(&mut self) -> Result<usize> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(BetError::malformed(format!(
                "declared length {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        Ok(len as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_length()?;
        self.read_bytes(len)
    }

    /// Fail unless every byte has been consumed
    pub fn finish(self) -> Result<()> {
        if !self.is_empty() {
            return Err(BetError::malformed(format!(
                "{} trailing bytes after offset {}",
                self.remaining(),
                self.pos
            )));
        }
        Ok(())
    }
}
