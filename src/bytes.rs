// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Bounds-checked big-endian reads over font table data
//!
//! All font tables are big-endian. Every read is checked against the end of
//! the table; an over-run fails the face load with an error naming the table
//! and the offset at which the read was attempted. There is no silent
//! truncation.

use crate::error::Error;
use ttf_parser::Tag;

/// Big-endian cursor over one font table
#[derive(Clone, Copy)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    tag: Tag,
}

impl<'a> ByteReader<'a> {
    pub fn new(tag: Tag, data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0, tag }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Reposition the cursor; `offset` may be one-past-the-end
    pub fn seek(&mut self, offset: usize) -> Result<(), Error> {
        if offset > self.data.len() {
            return Err(self.truncated(offset.saturating_sub(self.data.len())));
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.take(n).map(|_| ())
    }

    /// Read `n` raw bytes, advancing the cursor
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        match self.data.get(self.pos..self.pos + n) {
            Some(slice) => {
                self.pos += n;
                Ok(slice)
            }
            None => Err(self.truncated(n)),
        }
    }

    #[inline]
    fn truncated(&self, need: usize) -> Error {
        Error::Truncated {
            tag: self.tag,
            at: self.pos,
            need,
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a `u16` at `offset` without moving the cursor
    pub fn peek_u16_at(&self, offset: usize) -> Result<u16, Error> {
        match self.data.get(offset..offset + 2) {
            Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
            None => Err(Error::Truncated {
                tag: self.tag,
                at: offset,
                need: 2,
            }),
        }
    }

    /// Read a `u32` at `offset` without moving the cursor
    pub fn peek_u32_at(&self, offset: usize) -> Result<u32, Error> {
        match self.data.get(offset..offset + 4) {
            Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(Error::Truncated {
                tag: self.tag,
                at: offset,
                need: 4,
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TAG: Tag = Tag::from_bytes(b"Silf");

    #[test]
    fn typed_reads() {
        let data = [0x00u8, 0x03, 0x00, 0x00, 0xFF, 0xFE];
        let mut r = ByteReader::new(TAG, &data);
        assert_eq!(r.read_u32().unwrap(), 0x0003_0000);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.pos(), 6);
    }

    #[test]
    fn over_run_is_reported() {
        let data = [0x00u8, 0x01];
        let mut r = ByteReader::new(TAG, &data);
        r.read_u16().unwrap();
        match r.read_u16() {
            Err(Error::Truncated { tag, at, need }) => {
                assert_eq!(tag, TAG);
                assert_eq!(at, 2);
                assert_eq!(need, 2);
            }
            other => panic!("expected truncation error, got {other:?}"),
        }
    }

    #[test]
    fn peek_does_not_advance() {
        let data = [0x12u8, 0x34, 0x56, 0x78];
        let r = ByteReader::new(TAG, &data);
        assert_eq!(r.peek_u16_at(2).unwrap(), 0x5678);
        assert_eq!(r.pos(), 0);
    }
}
