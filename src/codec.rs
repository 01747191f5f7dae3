//! Binary Codec
//!
//! Little-endian primitives shared by the cache format: fixed-width integers
//! and floats, one-byte booleans, `u32`-length-prefixed strings and sequence
//! counts.
//!
//! Readers never trust a length prefix for allocation: strings are read
//! through [`Read::take`] so a corrupt length fails with `UnexpectedEof`
//! instead of reserving gigabytes, and [`BinaryReader::read_len`] callers cap
//! their `Vec::with_capacity` with [`capacity_hint`].

use std::io::{self, Read, Write};

use crate::errors::{CacheError, Result};

/// Upper bound for up-front allocations driven by on-disk counts.
const MAX_PREALLOC: usize = 1024;

/// Clamps an on-disk element count to a safe pre-allocation size.
#[inline]
#[must_use]
pub fn capacity_hint(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}

// ─── Writer ──────────────────────────────────────────────────────────────────

pub struct BinaryWriter<W> {
    inner: W,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Booleans are stored as a single `0` / `1` byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Writes a `u32` element count.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| CacheError::LengthOverflow(len))?;
        self.write_u32(len)
    }

    /// Writes a `u32` byte length followed by the raw UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_len(value.len())?;
        self.write_bytes(value.as_bytes())
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

// ─── Reader ──────────────────────────────────────────────────────────────────

pub struct BinaryReader<R> {
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Any non-zero byte reads as `true`.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a `u32` element count.
    #[inline]
    pub fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(capacity_hint(len));
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(bytes)
    }

    /// Discards exactly `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())?;
        if skipped != len as u64 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_u16(0x0102).unwrap();
        writer.write_u32(0x0304_0506).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_str("ab").unwrap();

        assert_eq!(
            writer.into_inner(),
            vec![0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 1, 2, 0, 0, 0, b'a', b'b']
        );
    }

    #[test]
    fn test_reader_mirrors_writer() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_u64(u64::MAX - 1).unwrap();
        writer.write_i32(-7).unwrap();
        writer.write_f32(1.5).unwrap();
        writer.write_str("pixel shader").unwrap();
        writer.write_u8(2).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(bytes.as_slice());
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert!((reader.read_f32().unwrap() - 1.5).abs() < f32::EPSILON);
        assert_eq!(reader.read_string().unwrap(), "pixel shader");
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn test_truncated_string_is_eof() {
        // Claims 100 bytes, provides 3.
        let bytes = [100u8, 0, 0, 0, b'a', b'b', b'c'];
        let mut reader = BinaryReader::new(&bytes[..]);

        match reader.read_string() {
            Err(CacheError::IoError(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[test]
    fn test_skip() {
        let bytes = [1u8, 2, 3, 4];
        let mut reader = BinaryReader::new(&bytes[..]);
        reader.skip(3).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 4);
        assert!(reader.skip(1).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [2u8, 0, 0, 0, 0xff, 0xfe];
        let mut reader = BinaryReader::new(&bytes[..]);
        assert!(matches!(reader.read_string(), Err(CacheError::InvalidUtf8(_))));
    }
}
