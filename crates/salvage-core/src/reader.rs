//! Positioned view over a byte buffer.
//!
//! The recovery pipeline walks a wallet file as one in-memory buffer. The
//! reader never yields partial fields: a read that would run past the end
//! fails with [`ReadError::OutOfRange`] and leaves the position untouched,
//! which is what lets the resynchronizer rewind and retry hypotheses cheaply.

use crate::error::ReadError;

/// Cursor over a borrowed byte slice with save/restore via
/// [`position`](BinaryReader::position) / [`set_position`](BinaryReader::set_position).
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Total buffer size in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Move the cursor to an absolute position. Positioning exactly at the
    /// end of the buffer is allowed (zero bytes remaining).
    pub fn set_position(&mut self, position: usize) -> Result<(), ReadError> {
        if position > self.buf.len() {
            return Err(ReadError::BadSeek {
                position,
                size: self.buf.len(),
            });
        }
        self.pos = position;
        Ok(())
    }

    pub fn advance(&mut self, n: usize) -> Result<(), ReadError> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        self.check(n)?;
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Fixed-width read, for checksum and key fields.
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let bytes = self.get_bytes(N)?;
        Ok(bytes.try_into().expect("length checked"))
    }

    pub fn get_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16_le(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_le_bytes(self.get_array()?))
    }

    pub fn get_u32_le(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.get_array()?))
    }

    pub fn get_u64_le(&mut self) -> Result<u64, ReadError> {
        Ok(u64::from_le_bytes(self.get_array()?))
    }

    pub fn get_i64_le(&mut self) -> Result<i64, ReadError> {
        Ok(i64::from_le_bytes(self.get_array()?))
    }

    fn check(&self, wanted: usize) -> Result<(), ReadError> {
        if wanted > self.remaining() {
            Err(ReadError::OutOfRange {
                position: self.pos,
                wanted,
                size: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }
}
