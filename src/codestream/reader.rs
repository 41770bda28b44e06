//! Sequential big-endian reader over a codestream byte buffer.

use crate::error::{CodecError, ViolationKind};

/// Tracks a read position; every failed read reports the byte offset at
/// which the stream ran short.
pub struct CodestreamReader<'a> {
    source: &'a [u8],
    position: usize,
}

impl<'a> CodestreamReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.source.len() - self.position
    }

    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    fn truncated(&self) -> CodecError {
        CodecError::codestream(self.position, ViolationKind::SegmentTruncated)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let byte = *self
            .source
            .get(self.position)
            .ok_or_else(|| self.truncated())?;
        self.position += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            *b = self.read_u8()?;
        }
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        let mut bytes = [0u8; 8];
        for b in bytes.iter_mut() {
            *b = self.read_u8()?;
        }
        Ok(f64::from_be_bytes(bytes))
    }

    /// The final two bytes of the source, where EOC must sit.
    pub fn tail_u16(&self) -> Option<u16> {
        let len = self.source.len();
        if len < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.source[len - 2], self.source[len - 1]]))
    }

    /// Peek the next two bytes without consuming them.
    pub fn peek_u16(&self) -> Option<u16> {
        let hi = *self.source.get(self.position)?;
        let lo = *self.source.get(self.position + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < count {
            return Err(self.truncated());
        }
        let slice = &self.source[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn advance(&mut self, count: usize) -> Result<(), CodecError> {
        if self.remaining() < count {
            return Err(self.truncated());
        }
        self.position += count;
        Ok(())
    }

    /// Jump to an absolute offset, which must not exceed the buffer.
    pub fn seek(&mut self, position: usize) -> Result<(), CodecError> {
        if position > self.source.len() {
            return Err(self.truncated());
        }
        self.position = position;
        Ok(())
    }
}
