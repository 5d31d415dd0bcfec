//! Bit-level read cursor and write channel
//!
//! Both sides use MSB-first bit order: the first bit read from a byte is its
//! most significant bit.

use crate::error::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

/// A read cursor over a byte buffer, addressed in bits
#[derive(Debug, Clone)]
pub struct BitBuffer {
    data: Bytes,
    position: u64,
}

impl BitBuffer {
    /// Create a cursor positioned at bit 0
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    /// Current bit position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the cursor; positions past the end are clamped to the end
    pub fn set_position(&mut self, position: u64) {
        self.position = position.min(self.bit_len());
    }

    /// Total length in bits
    pub fn bit_len(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    /// Bits left after the cursor
    pub fn remaining(&self) -> u64 {
        self.bit_len() - self.position
    }

    /// Read `count` bits (at most 64) as an unsigned big-endian number
    ///
    /// On failure the cursor does not move.
    pub fn read_bits(&mut self, count: u32) -> Result<u64, CodecError> {
        if count > 64 {
            return Err(CodecError::InvalidValue(format!(
                "cannot read {} bits into a 64-bit value",
                count
            )));
        }
        if u64::from(count) > self.remaining() {
            return Err(CodecError::EndOfBuffer {
                position: self.position,
                requested: u64::from(count),
                available: self.remaining(),
            });
        }

        let mut value: u64 = 0;
        for _ in 0..count {
            let byte = self.data[(self.position / 8) as usize];
            let bit = (byte >> (7 - (self.position % 8))) & 1;
            value = (value << 1) | u64::from(bit);
            self.position += 1;
        }
        Ok(value)
    }
}

/// An append-only bit sink used by encoders
#[derive(Debug, Default)]
pub struct BitChannel {
    bytes: BytesMut,
    bits: u64,
}

impl BitChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far
    pub fn position(&self) -> u64 {
        self.bits
    }

    /// Write the low `count` bits of `value`, most significant first
    pub fn write_bits(&mut self, value: u64, count: u32) -> Result<(), CodecError> {
        if count > 64 {
            return Err(CodecError::InvalidValue(format!(
                "cannot write {} bits from a 64-bit value",
                count
            )));
        }
        if count < 64 && value >> count != 0 {
            return Err(CodecError::InvalidValue(format!(
                "{} does not fit in {} bits",
                value, count
            )));
        }

        for i in (0..count).rev() {
            let bit = ((value >> i) & 1) as u8;
            let offset = (self.bits % 8) as u8;
            if offset == 0 {
                self.bytes.put_u8(0);
            }
            let last = self.bytes.len() - 1;
            self.bytes[last] |= bit << (7 - offset);
            self.bits += 1;
        }
        Ok(())
    }

    /// Finish writing; a trailing partial byte is zero-padded
    pub fn into_bytes(self) -> Bytes {
        self.bytes.freeze()
    }
}
