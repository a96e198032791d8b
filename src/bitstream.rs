//! Bit-addressable cursor over a byte buffer. This is the only place DSDL values touch raw
//! bytes.
//!
//! Bits are filled from the most significant end of each byte. Values wider than 8 bits go
//! out little-endian, one byte-sized chunk at a time; the last, partial chunk holds the
//! value's highest bits. This matches libuavcan and pydronecan, eg a `uint12` of `0xABC`
//! occupies `0xBC` followed by the 4 bits `0xA`.

use bitvec::prelude::*;

use crate::error::CodecError;

/// Append-only bit writer. Writing past the end grows the buffer.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bits: BitVec<u8, Msb0>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bit_len: usize) -> Self {
        Self {
            bits: BitVec::with_capacity(bit_len),
        }
    }

    /// Write the low `n` bits of `value`, `n` in 1..=8.
    pub fn write_bits(&mut self, value: u8, n: u8) {
        assert!((1..=8).contains(&n), "bit count {n} out of range");

        for i in (0..n).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
    }

    /// Write the low `bit_len` bits of `value`, `bit_len` in 1..=64.
    pub fn write_u64(&mut self, value: u64, bit_len: u8) {
        assert!((1..=64).contains(&bit_len), "bit length {bit_len} out of range");

        let mut remaining = bit_len;
        for byte in value.to_le_bytes() {
            if remaining == 0 {
                break;
            }
            let n = remaining.min(8);
            self.write_bits(byte, n);
            remaining -= n;
        }
    }

    /// Zero padding, eg for void fields.
    pub fn write_zeros(&mut self, bit_len: usize) {
        self.bits.resize(self.bits.len() + bit_len, false);
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// The written bits, zero-padded to a whole number of bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        let pad = (8 - self.bits.len() % 8) % 8;
        self.write_zeros(pad);
        self.bits.into_vec()
    }
}

/// Bit reader over a borrowed payload. Reading past the end is `TruncatedPayload`.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Msb0>,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bits: bytes.view_bits::<Msb0>(),
            pos: 0,
        }
    }

    /// Current position, as (byte offset, bit offset within that byte).
    pub fn position(&self) -> (usize, u8) {
        (self.pos / 8, (self.pos % 8) as u8)
    }

    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    fn ensure(&self, n: usize) -> Result<(), CodecError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::TruncatedPayload {
                needed: n - remaining,
            });
        }
        Ok(())
    }

    /// Read `n` bits, `n` in 1..=8, returned in the low bits.
    pub fn read_bits(&mut self, n: u8) -> Result<u8, CodecError> {
        assert!((1..=8).contains(&n), "bit count {n} out of range");
        self.ensure(n as usize)?;

        let mut result = 0;
        for bit in &self.bits[self.pos..self.pos + n as usize] {
            result = (result << 1) | (*bit as u8);
        }
        self.pos += n as usize;

        Ok(result)
    }

    /// Read a `bit_len`-bit value, `bit_len` in 1..=64. Not sign-extended.
    pub fn read_u64(&mut self, bit_len: u8) -> Result<u64, CodecError> {
        assert!((1..=64).contains(&bit_len), "bit length {bit_len} out of range");
        // Check up front so a failed read leaves the cursor where it was.
        self.ensure(bit_len as usize)?;

        let mut result = 0;
        let mut remaining = bit_len;
        let mut shift = 0;
        while remaining > 0 {
            let n = remaining.min(8);
            result |= (self.read_bits(n)? as u64) << shift;
            remaining -= n;
            shift += 8;
        }

        Ok(result)
    }

    pub fn skip(&mut self, bit_len: usize) -> Result<(), CodecError> {
        self.ensure(bit_len)?;
        self.pos += bit_len;
        Ok(())
    }
}
