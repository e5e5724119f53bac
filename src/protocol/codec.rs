//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.
//!
//! Decoding goes through [`Reader`], a cursor over a byte slice. Running out
//! of bytes is reported as [`Incomplete`] rather than an error: the framer
//! decides whether that means "wait for more input" or "the message is
//! shorter than its contents claim".

use zerocopy::FromBytes;

use super::types::{I16BE, I32BE, U32BE};

/// The reader ran out of bytes before the value was complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomplete;

/// Result of a [`Reader`] operation.
pub type ReadResult<T> = core::result::Result<T, Incomplete>;

/// Cursor over a message body.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// The unconsumed bytes.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    /// Advance by `n` bytes.
    #[inline]
    pub fn skip(&mut self, n: usize) -> ReadResult<()> {
        if self.remaining() < n {
            return Err(Incomplete);
        }
        self.pos += n;
        Ok(())
    }

    /// Consume everything that is left.
    #[inline]
    pub fn skip_rest(&mut self) {
        self.pos = self.data.len();
    }

    /// Read 1-byte unsigned integer.
    #[inline]
    pub fn read_u8(&mut self) -> ReadResult<u8> {
        let (&value, _) = self.rest().split_first().ok_or(Incomplete)?;
        self.pos += 1;
        Ok(value)
    }

    /// Read 2-byte big-endian signed integer.
    #[inline]
    pub fn read_i16(&mut self) -> ReadResult<i16> {
        let Ok((value, _)) = I16BE::read_from_prefix(self.rest()) else {
            return Err(Incomplete);
        };
        self.pos += 2;
        Ok(value.get())
    }

    /// Read 4-byte big-endian signed integer.
    #[inline]
    pub fn read_i32(&mut self) -> ReadResult<i32> {
        let Ok((value, _)) = I32BE::read_from_prefix(self.rest()) else {
            return Err(Incomplete);
        };
        self.pos += 4;
        Ok(value.get())
    }

    /// Read 4-byte big-endian unsigned integer.
    #[inline]
    pub fn read_u32(&mut self) -> ReadResult<u32> {
        let Ok((value, _)) = U32BE::read_from_prefix(self.rest()) else {
            return Err(Incomplete);
        };
        self.pos += 4;
        Ok(value.get())
    }

    /// Read a fixed-layout struct.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> ReadResult<T> {
        let Ok((value, _)) = T::read_from_prefix(self.rest()) else {
            return Err(Incomplete);
        };
        self.pos += size_of::<T>();
        Ok(value)
    }

    /// Read fixed-length bytes.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> ReadResult<&'a [u8]> {
        let bytes = self.rest().get(..len).ok_or(Incomplete)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Read null-terminated string (PostgreSQL String type).
    /// Returns the string bytes without the null terminator.
    #[inline]
    pub fn read_cstring(&mut self) -> ReadResult<&'a [u8]> {
        let rest = self.rest();
        let end = memchr::memchr(0, rest).ok_or(Incomplete)?;
        self.pos += end + 1;
        rest.get(..end).ok_or(Incomplete)
    }

    /// Read null-terminated string as an owned `String`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected: the server sends text
    /// in the client encoding, which need not be UTF-8.
    #[inline]
    pub fn read_string(&mut self) -> ReadResult<String> {
        self.read_cstring().map(decode_text)
    }
}

/// Decode wire text, validating with simdutf8 and falling back to lossy decoding.
pub fn decode_text(bytes: &[u8]) -> String {
    match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian signed integer.
#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write null-terminated string (PostgreSQL String type).
#[inline]
pub fn write_cstring(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s);
    out.push(0);
}

/// Write null-terminated string from &str.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    write_cstring(out, s.as_bytes());
}

/// Message builder helper that handles the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Start building a startup-style message (no type byte).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    /// Write an i16.
    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        if let Some(slot) = self.buf.get_mut(self.start..self.start + 4) {
            slot.copy_from_slice(&len.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_incomplete_without_advancing() {
        let mut r = Reader::new(&[0x00, 0x01, 0xff]);
        assert_eq!(r.read_i16(), Ok(1));
        assert_eq!(r.read_i32(), Err(Incomplete));
        assert_eq!(r.position(), 2);
        assert_eq!(r.read_u8(), Ok(0xff));
        assert_eq!(r.read_u8(), Err(Incomplete));
    }

    #[test]
    fn reader_cstring() {
        let mut r = Reader::new(b"abc\0de\0f");
        assert_eq!(r.read_cstring(), Ok(&b"abc"[..]));
        assert_eq!(r.read_string(), Ok("de".to_string()));
        assert_eq!(r.read_cstring(), Err(Incomplete));
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut r = Reader::new(b"a\xffb\0");
        assert_eq!(r.read_string(), Ok("a\u{fffd}b".to_string()));
    }

    #[test]
    fn negative_integers() {
        let mut r = Reader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(r.read_i32(), Ok(-1));
        assert_eq!(r.read_i16(), Ok(-2));
    }

    #[test]
    fn message_builder_sets_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'Q');
        msg.write_cstr("SELECT 1");
        msg.finish();
        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[1..5], &13_i32.to_be_bytes());
    }
}
