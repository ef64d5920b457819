//! Binary Record Codec
//!
//! Compact, deterministic encoding of cached records for the L2 store (and
//! for the byte-oriented L1 variant).
//!
//! # Wire Layout
//!
//! ```text
//! ┌────────┬──────────────────────────────┬────────────────────────────────┐
//! │ tag u8 │ fixed-width numeric header   │ length-prefixed UTF-8 strings  │
//! │        │ (big-endian, per-type fixed) │ (u8 or u16 prefix, per field)  │
//! └────────┴──────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! All multi-byte integers are big-endian for every record type. The
//! leading tag byte identifies the record layout so a payload of one type is
//! never decoded as another.
//!
//! Decoding validates the fixed header length before touching any field and
//! bounds-checks every variable section. Decoding never panics: any
//! malformed input yields a [`CodecError`].

mod records;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub use records::{FORUM_TAG, TAG_TAG, THREAD_TAG, USER_TAG};

/// Encode/decode pair for a cacheable record.
pub trait Codec: Sized {
    /// Serialize the record.
    ///
    /// Fails only when a string field does not fit its length prefix.
    fn encode(&self) -> Result<Bytes, CodecError>;

    /// Deserialize a record, rejecting any malformed buffer.
    fn decode(buf: &[u8]) -> Result<Self, CodecError>;
}

/// Codec failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer shorter than the section being read
    #[error("buffer truncated at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Payload belongs to a different record type
    #[error("layout tag mismatch: expected {expected:#04x}, found {found:#04x}")]
    LayoutMismatch { expected: u8, found: u8 },

    /// String field is not valid UTF-8
    #[error("field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// Bytes left over after the last field
    #[error("{count} trailing bytes after record")]
    TrailingBytes { count: usize },

    /// String does not fit its length prefix
    #[error("field '{field}' is {len} bytes, prefix allows at most {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

// =============================================================================
// Writer
// =============================================================================

/// Append-only encoder over a pre-sized buffer
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new(tag: u8, capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(capacity + 1);
        buf.put_u8(tag);
        Self { buf }
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub(crate) fn i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// String with a one-byte length prefix
    pub(crate) fn str8(&mut self, field: &'static str, s: &str) -> Result<(), CodecError> {
        let len = check_len(field, s, u8::MAX as usize)?;
        self.buf.put_u8(len as u8);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    /// String with a two-byte length prefix
    pub(crate) fn str16(&mut self, field: &'static str, s: &str) -> Result<(), CodecError> {
        let len = check_len(field, s, u16::MAX as usize)?;
        self.buf.put_u16(len as u16);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

fn check_len(field: &'static str, s: &str, max: usize) -> Result<usize, CodecError> {
    let len = s.len();
    if len > max {
        return Err(CodecError::FieldTooLong { field, len, max });
    }
    Ok(len)
}

// =============================================================================
// Reader
// =============================================================================

/// Bounds-checked cursor over an encoded record
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Open a record: checks `fixed_len` (tag included) is present and the
    /// tag matches before any field is read.
    pub(crate) fn open(buf: &'a [u8], tag: u8, fixed_len: usize) -> Result<Self, CodecError> {
        if buf.len() < fixed_len {
            return Err(CodecError::Truncated {
                offset: 0,
                needed: fixed_len,
                available: buf.len(),
            });
        }
        if buf[0] != tag {
            return Err(CodecError::LayoutMismatch {
                expected: tag,
                found: buf[0],
            });
        }
        Ok(Self { buf, offset: 1 })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.offset;
        if available < n {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed: n,
                available,
            });
        }
        let slice = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?.get_u8())
    }

    pub(crate) fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.take(4)?.get_i32())
    }

    pub(crate) fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.take(8)?.get_i64())
    }

    pub(crate) fn str8(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.u8()? as usize;
        self.utf8(field, len)
    }

    pub(crate) fn str16(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.take(2)?.get_u16() as usize;
        self.utf8(field, len)
    }

    fn utf8(&mut self, field: &'static str, len: usize) -> Result<String, CodecError> {
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8 { field })
    }

    /// Reject leftover bytes
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        let count = self.buf.len() - self.offset;
        if count != 0 {
            return Err(CodecError::TrailingBytes { count });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_is_big_endian() {
        let mut w = Writer::new(0xAA, 12);
        w.i32(1);
        w.i64(2);
        let out = w.finish();
        assert_eq!(
            out.as_ref(),
            &[0xAA, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_str8_rejects_oversized_field() {
        let mut w = Writer::new(0, 0);
        let long = "x".repeat(256);
        assert_eq!(
            w.str8("name", &long),
            Err(CodecError::FieldTooLong {
                field: "name",
                len: 256,
                max: 255
            })
        );
        assert!(w.str8("name", &long[..255]).is_ok());
    }

    #[test]
    fn test_reader_checks_fixed_header_first() {
        let err = Reader::open(&[0x01, 0x02], 0x01, 5).err();
        assert_eq!(
            err,
            Some(CodecError::Truncated {
                offset: 0,
                needed: 5,
                available: 2
            })
        );
    }

    #[test]
    fn test_reader_rejects_wrong_tag() {
        let err = Reader::open(&[0x02, 0, 0, 0, 0], 0x01, 5).err();
        assert_eq!(
            err,
            Some(CodecError::LayoutMismatch {
                expected: 0x01,
                found: 0x02
            })
        );
    }

    #[test]
    fn test_reader_string_length_past_end() {
        // Tag, then a u8 prefix claiming 10 bytes with only 2 present
        let buf = [0x01, 10, b'h', b'i'];
        let mut r = Reader::open(&buf, 0x01, 2).unwrap();
        assert_eq!(
            r.str8("name"),
            Err(CodecError::Truncated {
                offset: 2,
                needed: 10,
                available: 2
            })
        );
    }

    #[test]
    fn test_reader_invalid_utf8() {
        let buf = [0x01, 2, 0xFF, 0xFE];
        let mut r = Reader::open(&buf, 0x01, 2).unwrap();
        assert_eq!(
            r.str8("slug"),
            Err(CodecError::InvalidUtf8 { field: "slug" })
        );
    }

    #[test]
    fn test_reader_trailing_bytes() {
        let buf = [0x01, 7, 9];
        let mut r = Reader::open(&buf, 0x01, 2).unwrap();
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.finish(), Err(CodecError::TrailingBytes { count: 1 }));
    }
}
