//! Bounded cursor over a received frame.
//!
//! Every multi-field parse goes through [`ByteReader`] so that a truncated or
//! adversarial frame surfaces as [`OutOfBounds`] instead of a slice panic.

use std::fmt;

/// A read past the end of the underlying buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    /// Offset the read started at.
    pub at: usize,
    /// Bytes requested.
    pub wanted: usize,
    /// Bytes left in the buffer at `at`.
    pub available: usize,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wanted {} bytes at offset {}, only {} available",
            self.wanted, self.at, self.available
        )
    }
}

impl std::error::Error for OutOfBounds {}

/// Forward-only reader with an explicit position.
///
/// A failed read leaves the position untouched.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start reading at `offset`. An offset past the end yields an empty reader
    /// positioned at the end of the buffer.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self {
            buf,
            pos: offset.min(buf.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], OutOfBounds> {
        if n > self.remaining() {
            return Err(OutOfBounds {
                at: self.pos,
                wanted: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Take exactly `N` bytes as an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], OutOfBounds> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, OutOfBounds> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, OutOfBounds> {
        Ok(u16::from_be_bytes(self.read_array::<2>()?))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), OutOfBounds> {
        self.read(n).map(|_| ())
    }

    /// Everything after the current position. Does not advance.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() {
        let buf = [0x01, 0x01, 0xbb, 0xaa, 0xbb, 0xcc];
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_u16_be().unwrap(), 443);
        assert_eq!(r.position(), 3);
        assert_eq!(r.rest(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(r.read(3).unwrap(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(r.remaining(), 0);
        assert!(r.rest().is_empty());
    }

    #[test]
    fn failed_read_does_not_advance() {
        let buf = [1, 2, 3];
        let mut r = ByteReader::new(&buf);
        r.skip(1).unwrap();
        let err = r.read(5).unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                at: 1,
                wanted: 5,
                available: 2
            }
        );
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_array::<2>().unwrap(), [2, 3]);
    }

    #[test]
    fn empty_buffer() {
        let mut r = ByteReader::new(&[]);
        assert!(r.read_u8().is_err());
        assert!(r.read_u16_be().is_err());
        assert_eq!(r.read(0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn offset_past_end_is_clamped() {
        let buf = [9u8; 4];
        let mut r = ByteReader::at(&buf, 10);
        assert_eq!(r.position(), 4);
        assert!(r.read_u8().is_err());
    }
}
