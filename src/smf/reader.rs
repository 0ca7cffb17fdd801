//! Cursor-based big-endian byte reader

use crate::error::{Error, Result};

/// Byte-stream reader over an in-memory MIDI file
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a new reader over raw file data
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if we've reached the end of data
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn ensure(&self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(Error::TruncatedInput {
                offset: self.pos,
                wanted: len,
            });
        }
        Ok(())
    }

    /// Look at the next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a 16-bit big-endian value
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    /// Read a 32-bit big-endian value
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let hi = self.read_u16_be()? as u32;
        let lo = self.read_u16_be()? as u32;
        Ok((hi << 16) | lo)
    }

    /// Read an unsigned big-endian integer of 1, 2 or 4 bytes
    pub fn read_fixed(&mut self, width: usize) -> Result<u32> {
        match width {
            1 => Ok(self.read_u8()? as u32),
            2 => Ok(self.read_u16_be()? as u32),
            4 => self.read_u32_be(),
            _ => Err(Error::InvalidReadWidth(width)),
        }
    }

    /// Read a variable-length quantity (7 bits per byte, high bit = more).
    ///
    /// At most four bytes are consumed; a fourth byte with its continuation
    /// bit set simply ends the value.
    pub fn read_var_len(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            let byte = self.read_u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }

    /// Return the next `len` bytes and advance past them
    pub fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Advance past `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.slice(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_fixed(1).unwrap(), 0x12);
        assert_eq!(r.read_fixed(2).unwrap(), 0x3456);
        assert_eq!(r.read_fixed(4).unwrap(), 0x789ABCDE);
        assert!(r.is_eof());
    }

    #[test]
    fn test_invalid_width() {
        let data = [0; 8];
        let mut r = ByteReader::new(&data);
        assert!(matches!(r.read_fixed(3), Err(Error::InvalidReadWidth(3))));
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_var_len() {
        let cases: &[(&[u8], u32)] = &[
            (&[0x00], 0),
            (&[0x7F], 0x7F),
            (&[0x81, 0x00], 0x80),
            (&[0xC0, 0x00], 0x2000),
            (&[0xFF, 0x7F], 0x3FFF),
            (&[0x81, 0x80, 0x00], 0x4000),
            (&[0xFF, 0xFF, 0xFF, 0x7F], 0x0FFF_FFFF),
        ];
        for (bytes, expected) in cases {
            let mut r = ByteReader::new(bytes);
            assert_eq!(r.read_var_len().unwrap(), *expected);
            assert_eq!(r.position(), bytes.len());
        }
    }

    #[test]
    fn test_var_len_stops_after_four_bytes() {
        let data = [0x81, 0x81, 0x81, 0x81, 0x01];
        let mut r = ByteReader::new(&data);
        r.read_var_len().unwrap();
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn test_truncated() {
        let data = [0x12];
        let mut r = ByteReader::new(&data);
        assert!(matches!(
            r.read_u16_be(),
            Err(Error::TruncatedInput { offset: 1, wanted: 1 })
        ));

        let mut r = ByteReader::new(&data);
        assert!(matches!(
            r.slice(2),
            Err(Error::TruncatedInput { offset: 0, wanted: 2 })
        ));

        let data = [0x81];
        let mut r = ByteReader::new(&data);
        assert!(r.read_var_len().is_err());
    }

    #[test]
    fn test_slice_advances() {
        let data = [1, 2, 3, 4];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.slice(3).unwrap(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 1);
        assert_eq!(r.peek_u8().unwrap(), 4);
        assert_eq!(r.position(), 3);
    }
}
