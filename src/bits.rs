//! Integer helpers for little-endian spans and MSB-first bit streams.

use crate::error::PmdError;

/// Sign-extend the low `bits` bits of `value`.
#[inline]
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Read an unsigned little-endian integer from a span of 1 to 8 bytes.
#[inline]
pub fn unsigned_le(bytes: &[u8]) -> u64 {
    debug_assert!(bytes.len() <= 8);
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (8 * i)))
}

/// Read a two's-complement little-endian integer, sign-extended from the
/// span's own width.
///
/// ```
/// # use polar_pmd::bits::signed_le;
/// assert_eq!(signed_le(&[0xF7, 0xFF]), -9);
/// assert_eq!(signed_le(&[0xFF, 0xFF, 0x7F]), 0x7FFFFF);
/// assert_eq!(signed_le(&[0x00, 0x00, 0x80]), -0x800000);
/// ```
#[inline]
pub fn signed_le(bytes: &[u8]) -> i64 {
    let width = bytes.len().min(8) as u32;
    sign_extend(unsigned_le(bytes), width * 8)
}

/// Bounds-checked sequential reader over a byte slice.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
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

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], PmdError> {
        if self.remaining() < n {
            return Err(PmdError::too_short("read past end", self.pos + n, self.data.len()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, PmdError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16, PmdError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn unsigned(&mut self, width: usize) -> Result<u64, PmdError> {
        Ok(unsigned_le(self.take(width)?))
    }

    pub fn signed(&mut self, width: usize) -> Result<i64, PmdError> {
        Ok(signed_le(self.take(width)?))
    }
}

/// Cursor over a packed bit stream.
///
/// Bits are consumed most-significant first within each byte, and the first
/// bit read becomes the most significant bit of the value.
pub struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bit
    }

    /// Read `width` bits (1..=32) as an unsigned value.
    pub fn read_unsigned(&mut self, width: u32) -> Result<u32, PmdError> {
        if width == 0 || width > 32 {
            return Err(PmdError::format(format!("bit width {width} out of range")));
        }
        if self.bits_remaining() < width as usize {
            return Err(PmdError::format(format!(
                "bit stream exhausted: need {width} bits, {} left",
                self.bits_remaining()
            )));
        }
        let mut value = 0u32;
        for _ in 0..width {
            let byte = self.data[self.bit / 8];
            let bit = (byte >> (7 - (self.bit % 8))) & 1;
            value = (value << 1) | u32::from(bit);
            self.bit += 1;
        }
        Ok(value)
    }

    /// Read `width` bits and sign-extend them.
    pub fn read_signed(&mut self, width: u32) -> Result<i32, PmdError> {
        let raw = self.read_unsigned(width)?;
        Ok(sign_extend(u64::from(raw), width) as i32)
    }
}
