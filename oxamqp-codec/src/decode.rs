//! Decoding of AMQP 1.0 values from a byte buffer

use bytes::Bytes;
use ordered_float::OrderedFloat;

use crate::{
    descriptor::Descriptor,
    format_code::{Category, EncodingCodes},
    Error,
};

/// Reads a value from a [`Reader`]
pub trait Decode: Sized {
    /// Reads one constructor and its payload, advancing the reader past them
    fn decode(reader: &mut Reader) -> Result<Self, Error>;
}

/// A cursor over an immutable buffer
///
/// Slices taken out of the reader (binary payloads, frame payloads) share the underlying
/// allocation. Offsets reported in errors are relative to the start of the buffer.
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
    pos: usize,
}

/// Size and count of a compound value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundHeader {
    /// Offset right after the last byte of the compound value
    pub end: usize,
    /// Number of items declared by the header
    pub count: u32,
}

impl Reader {
    /// Creates a reader positioned at the start of `buf`
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Current offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Takes every byte left without copying
    pub fn split_remaining(&mut self) -> Bytes {
        let rest = self.buf.slice(self.pos..);
        self.pos = self.buf.len();
        rest
    }

    fn eof(&self, needed: usize) -> Error {
        Error::UnexpectedEof {
            offset: self.pos,
            needed: needed - self.remaining(),
        }
    }

    /// Bytes from `start` up to the current offset, without copying
    pub(crate) fn slice_from(&self, start: usize) -> Bytes {
        self.buf.slice(start..self.pos)
    }

    /// Peeks the next byte
    pub fn peek_u8(&self) -> Result<u8, Error> {
        self.buf.get(self.pos).copied().ok_or_else(|| self.eof(1))
    }

    /// Reads one byte
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads exactly `N` bytes
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        if self.remaining() < N {
            return Err(self.eof(N));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Takes `len` bytes without copying
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, Error> {
        if self.remaining() < len {
            return Err(self.eof(len));
        }
        let bytes = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(bytes)
    }

    /// Peeks the next constructor
    pub fn peek_code(&self) -> Result<EncodingCodes, Error> {
        EncodingCodes::parse(self.peek_u8()?, self.pos)
    }

    /// Reads a constructor, returning its offset along with it
    pub fn read_code(&mut self) -> Result<(usize, EncodingCodes), Error> {
        let offset = self.pos;
        let code = EncodingCodes::parse(self.read_u8()?, offset)?;
        Ok((offset, code))
    }

    /// Whether the next value is `null`
    pub fn next_is_null(&self) -> bool {
        matches!(self.peek_u8(), Ok(byte) if byte == EncodingCodes::Null as u8)
    }

    /// Reads any value of type `T`
    pub fn decode<T: Decode>(&mut self) -> Result<T, Error> {
        T::decode(self)
    }

    fn read_width(&mut self, width: usize) -> Result<usize, Error> {
        match width {
            1 => Ok(self.read_u8()? as usize),
            _ => Ok(u32::from_be_bytes(self.read_array()?) as usize),
        }
    }

    /// Reads the size-prefixed payload of a binary, string or symbol
    pub(crate) fn read_variable(&mut self, code: EncodingCodes) -> Result<Bytes, Error> {
        let width = match code.category() {
            Category::Variable(width) => width,
            _ => 0,
        };
        let len = self.read_width(width)?;
        self.read_bytes(len)
    }

    pub(crate) fn read_string_body(&mut self, code: EncodingCodes) -> Result<String, Error> {
        let bytes = self.read_variable(code)?;
        let offset = self.pos - bytes.len();
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 {
            offset,
            expected: "string",
        })
    }

    /// Reads the size and count following a list, map or array constructor found at `offset`
    pub fn read_compound_header(
        &mut self,
        code: EncodingCodes,
        offset: usize,
    ) -> Result<CompoundHeader, Error> {
        let width = match code.category() {
            Category::Compound(width) | Category::Array(width) => width,
            _ if code == EncodingCodes::List0 => {
                return Ok(CompoundHeader {
                    end: self.pos,
                    count: 0,
                })
            }
            _ => {
                return Err(Error::TypeMismatch {
                    offset,
                    expected: "compound",
                    found: code,
                })
            }
        };
        let size = self.read_width(width)?;
        if size < width {
            return Err(Error::LengthMismatch { offset });
        }
        let end = self.pos + size;
        if end > self.buf.len() {
            return Err(self.eof(size));
        }
        let count = self.read_width(width)? as u32;
        Ok(CompoundHeader { end, count })
    }

    /// Checks that a compound value found at `offset` ended exactly at `end`
    pub fn expect_end(&self, end: usize, offset: usize) -> Result<(), Error> {
        match self.pos == end {
            true => Ok(()),
            false => Err(Error::LengthMismatch { offset }),
        }
    }

    /// Reads the `0x00` marker and the descriptor of a described value
    pub fn read_descriptor(&mut self) -> Result<(usize, Descriptor), Error> {
        match self.read_code()? {
            (offset, EncodingCodes::DescribedType) => {
                let descriptor = Descriptor::decode(self)?;
                Ok((offset, descriptor))
            }
            (offset, found) => Err(Error::TypeMismatch {
                offset,
                expected: "described",
                found,
            }),
        }
    }

    /// Peeks the descriptor of the next described value without consuming it
    pub fn peek_descriptor(&self) -> Result<Descriptor, Error> {
        let mut lookahead = self.clone();
        lookahead.read_descriptor().map(|(_, descriptor)| descriptor)
    }

    /// Skips over one value
    pub fn skip_value(&mut self) -> Result<(), Error> {
        let (offset, code) = self.read_code()?;
        self.skip_body(code, offset)
    }

    fn skip_body(&mut self, code: EncodingCodes, offset: usize) -> Result<(), Error> {
        match code.category() {
            Category::Fixed(_) if code == EncodingCodes::DescribedType => {
                self.skip_value()?;
                self.skip_value()
            }
            Category::Fixed(width) => self.read_bytes(width).map(|_| ()),
            Category::Variable(_) => self.read_variable(code).map(|_| ()),
            Category::Compound(_) | Category::Array(_) => {
                let header = self.read_compound_header(code, offset)?;
                self.pos = header.end;
                Ok(())
            }
        }
    }
}

fn mismatch<T>(offset: usize, expected: &'static str, found: EncodingCodes) -> Result<T, Error> {
    Err(Error::TypeMismatch {
        offset,
        expected,
        found,
    })
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        if reader.next_is_null() {
            reader.pos += 1;
            return Ok(None);
        }
        T::decode(reader).map(Some)
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        T::decode(reader).map(Box::new)
    }
}

impl Decode for () {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Null) => Ok(()),
            (offset, found) => mismatch(offset, "null", found),
        }
    }
}

impl Decode for bool {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::BooleanTrue) => Ok(true),
            (_, EncodingCodes::BooleanFalse) => Ok(false),
            (_, EncodingCodes::Boolean) => {
                let offset = reader.position();
                match reader.read_u8()? {
                    0x00 => Ok(false),
                    0x01 => Ok(true),
                    _ => Err(Error::InvalidValue {
                        offset,
                        expected: "boolean",
                    }),
                }
            }
            (offset, found) => mismatch(offset, "boolean", found),
        }
    }
}

impl Decode for u8 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::UByte) => reader.read_u8(),
            (offset, found) => mismatch(offset, "ubyte", found),
        }
    }
}

impl Decode for u16 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::UShort) => Ok(u16::from_be_bytes(reader.read_array()?)),
            (offset, found) => mismatch(offset, "ushort", found),
        }
    }
}

impl Decode for u32 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::UInt) => Ok(u32::from_be_bytes(reader.read_array()?)),
            (_, EncodingCodes::SmallUInt) => Ok(reader.read_u8()? as u32),
            (_, EncodingCodes::UInt0) => Ok(0),
            (offset, found) => mismatch(offset, "uint", found),
        }
    }
}

impl Decode for u64 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::ULong) => Ok(u64::from_be_bytes(reader.read_array()?)),
            (_, EncodingCodes::SmallULong) => Ok(reader.read_u8()? as u64),
            (_, EncodingCodes::ULong0) => Ok(0),
            (offset, found) => mismatch(offset, "ulong", found),
        }
    }
}

impl Decode for i8 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Byte) => Ok(reader.read_u8()? as i8),
            (offset, found) => mismatch(offset, "byte", found),
        }
    }
}

impl Decode for i16 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Short) => Ok(i16::from_be_bytes(reader.read_array()?)),
            (offset, found) => mismatch(offset, "short", found),
        }
    }
}

impl Decode for i32 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Int) => Ok(i32::from_be_bytes(reader.read_array()?)),
            (_, EncodingCodes::SmallInt) => Ok(reader.read_u8()? as i8 as i32),
            (offset, found) => mismatch(offset, "int", found),
        }
    }
}

impl Decode for i64 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Long) => Ok(i64::from_be_bytes(reader.read_array()?)),
            (_, EncodingCodes::SmallLong) => Ok(reader.read_u8()? as i8 as i64),
            (offset, found) => mismatch(offset, "long", found),
        }
    }
}

impl Decode for f32 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Float) => Ok(f32::from_be_bytes(reader.read_array()?)),
            (offset, found) => mismatch(offset, "float", found),
        }
    }
}

impl Decode for f64 {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Double) => Ok(f64::from_be_bytes(reader.read_array()?)),
            (offset, found) => mismatch(offset, "double", found),
        }
    }
}

impl Decode for OrderedFloat<f32> {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        f32::decode(reader).map(OrderedFloat)
    }
}

impl Decode for OrderedFloat<f64> {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        f64::decode(reader).map(OrderedFloat)
    }
}

impl Decode for char {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Char) => {
                let offset = reader.position();
                let value = u32::from_be_bytes(reader.read_array()?);
                char::from_u32(value).ok_or(Error::InvalidChar { offset, value })
            }
            (offset, found) => mismatch(offset, "char", found),
        }
    }
}

impl Decode for String {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, code @ (EncodingCodes::Str8 | EncodingCodes::Str32)) => {
                reader.read_string_body(code)
            }
            (offset, found) => mismatch(offset, "string", found),
        }
    }
}

impl Decode for Bytes {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, code @ (EncodingCodes::VBin8 | EncodingCodes::VBin32)) => {
                reader.read_variable(code)
            }
            (offset, found) => mismatch(offset, "binary", found),
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        let (offset, code) = reader.read_code()?;
        match code {
            EncodingCodes::List0 | EncodingCodes::List8 | EncodingCodes::List32 => {
                let header = reader.read_compound_header(code, offset)?;
                let mut items = Vec::with_capacity((header.count as usize).min(reader.remaining()));
                for _ in 0..header.count {
                    items.push(T::decode(reader)?);
                }
                reader.expect_end(header.end, offset)?;
                Ok(items)
            }
            found => mismatch(offset, "list", found),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_buffer_reports_offset() {
        let mut reader = Reader::new(vec![0x70, 0x00, 0x01]);
        let err = reader.decode::<u32>().unwrap_err();
        assert_eq!(err, Error::UnexpectedEof { offset: 1, needed: 2 });
    }

    #[test]
    fn invalid_boolean_payload() {
        let mut reader = Reader::new(vec![0x56, 0x02]);
        let err = reader.decode::<bool>().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidValue {
                offset: 1,
                expected: "boolean"
            }
        );
    }

    #[test]
    fn peeking_a_descriptor_leaves_the_reader_in_place() {
        let mut reader = Reader::new(vec![0x00, 0x53, 0x18, 0x45]);
        assert_eq!(reader.peek_descriptor().unwrap(), Descriptor::Code(0x18));
        assert_eq!(reader.position(), 0);
        reader.skip_value().unwrap();
        assert!(reader.is_empty());
    }
}
