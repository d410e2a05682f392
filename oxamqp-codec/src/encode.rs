//! Encoding of AMQP 1.0 values into a byte buffer

use bytes::{BufMut, Bytes, BytesMut};
use ordered_float::OrderedFloat;

use crate::format_code::EncodingCodes;

/// Size of the speculative header of a compound value: constructor, size32, count32
const COMPOUND_HEADER_LEN: usize = 9;
const COMPACT_HEADER_LEN: usize = 3;

/// Appends the canonical AMQP encoding of a value to a buffer
///
/// Integers are written in their smallest representation. Compound values are written with
/// the 8-bit size and count whenever both fit.
pub trait Encode {
    /// Appends the encoding of `self` to `buf`
    fn encode(&self, buf: &mut BytesMut);
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, buf: &mut BytesMut) {
        (**self).encode(buf)
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode(&self, buf: &mut BytesMut) {
        (**self).encode(buf)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Some(value) => value.encode(buf),
            None => buf.put_u8(EncodingCodes::Null as u8),
        }
    }
}

impl Encode for () {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Null as u8);
    }
}

impl Encode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            true => buf.put_u8(EncodingCodes::BooleanTrue as u8),
            false => buf.put_u8(EncodingCodes::BooleanFalse as u8),
        }
    }
}

impl Encode for u8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::UByte as u8);
        buf.put_u8(*self);
    }
}

impl Encode for u16 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::UShort as u8);
        buf.put_u16(*self);
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut BytesMut) {
        match *self {
            0 => buf.put_u8(EncodingCodes::UInt0 as u8),
            v @ 1..=255 => {
                buf.put_u8(EncodingCodes::SmallUInt as u8);
                buf.put_u8(v as u8);
            }
            v => {
                buf.put_u8(EncodingCodes::UInt as u8);
                buf.put_u32(v);
            }
        }
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut BytesMut) {
        match *self {
            0 => buf.put_u8(EncodingCodes::ULong0 as u8),
            v @ 1..=255 => {
                buf.put_u8(EncodingCodes::SmallULong as u8);
                buf.put_u8(v as u8);
            }
            v => {
                buf.put_u8(EncodingCodes::ULong as u8);
                buf.put_u64(v);
            }
        }
    }
}

impl Encode for i8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Byte as u8);
        buf.put_i8(*self);
    }
}

impl Encode for i16 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Short as u8);
        buf.put_i16(*self);
    }
}

impl Encode for i32 {
    fn encode(&self, buf: &mut BytesMut) {
        match i8::try_from(*self) {
            Ok(small) => {
                buf.put_u8(EncodingCodes::SmallInt as u8);
                buf.put_i8(small);
            }
            Err(_) => {
                buf.put_u8(EncodingCodes::Int as u8);
                buf.put_i32(*self);
            }
        }
    }
}

impl Encode for i64 {
    fn encode(&self, buf: &mut BytesMut) {
        match i8::try_from(*self) {
            Ok(small) => {
                buf.put_u8(EncodingCodes::SmallLong as u8);
                buf.put_i8(small);
            }
            Err(_) => {
                buf.put_u8(EncodingCodes::Long as u8);
                buf.put_i64(*self);
            }
        }
    }
}

impl Encode for f32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Float as u8);
        buf.put_f32(*self);
    }
}

impl Encode for f64 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Double as u8);
        buf.put_f64(*self);
    }
}

impl Encode for OrderedFloat<f32> {
    fn encode(&self, buf: &mut BytesMut) {
        self.0.encode(buf)
    }
}

impl Encode for OrderedFloat<f64> {
    fn encode(&self, buf: &mut BytesMut) {
        self.0.encode(buf)
    }
}

impl Encode for char {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Char as u8);
        buf.put_u32(*self as u32);
    }
}

impl Encode for str {
    fn encode(&self, buf: &mut BytesMut) {
        put_variable(buf, EncodingCodes::Str8, EncodingCodes::Str32, self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_str().encode(buf)
    }
}

impl Encode for Bytes {
    fn encode(&self, buf: &mut BytesMut) {
        put_variable(buf, EncodingCodes::VBin8, EncodingCodes::VBin32, self);
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        encode_list(buf, self.iter())
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, buf: &mut BytesMut) {
        encode_list(buf, self.iter())
    }
}

fn encode_list<'a, T, I>(buf: &mut BytesMut, items: I)
where
    T: Encode + 'a,
    I: ExactSizeIterator<Item = &'a T>,
{
    if items.len() == 0 {
        buf.put_u8(EncodingCodes::List0 as u8);
        return;
    }
    let count = items.len() as u32;
    let writer = CompoundWriter::begin(buf, CompoundKind::List);
    for item in items {
        item.encode(buf);
    }
    writer.finish(buf, count);
}

/// Writes a binary, string or symbol with the 8-bit length form when possible
pub(crate) fn put_variable(
    buf: &mut BytesMut,
    code8: EncodingCodes,
    code32: EncodingCodes,
    bytes: &[u8],
) {
    match u8::try_from(bytes.len()) {
        Ok(len) => {
            buf.put_u8(code8 as u8);
            buf.put_u8(len);
        }
        Err(_) => {
            buf.put_u8(code32 as u8);
            buf.put_u32(bytes.len() as u32);
        }
    }
    buf.put_slice(bytes);
}

/// Kind of compound value written by a [`CompoundWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundKind {
    /// list8/list32
    List,
    /// map8/map32
    Map,
    /// array8/array32
    Array,
}

impl CompoundKind {
    fn codes(&self) -> (EncodingCodes, EncodingCodes) {
        match self {
            CompoundKind::List => (EncodingCodes::List8, EncodingCodes::List32),
            CompoundKind::Map => (EncodingCodes::Map8, EncodingCodes::Map32),
            CompoundKind::Array => (EncodingCodes::Array8, EncodingCodes::Array32),
        }
    }
}

/// Writes a compound value whose size and count are only known once its content is written
///
/// [`begin`](Self::begin) reserves the 9 bytes of the 32-bit header at the write position.
/// [`finish`](Self::finish) back-patches the header, or rewrites it in the 3-byte 8-bit
/// form and moves the content down when both the size and the count fit in a byte.
#[derive(Debug)]
#[must_use = "the header is only valid after calling `finish`"]
pub struct CompoundWriter {
    start: usize,
    kind: CompoundKind,
}

impl CompoundWriter {
    /// Reserves the header at the end of `buf`
    pub fn begin(buf: &mut BytesMut, kind: CompoundKind) -> Self {
        let start = buf.len();
        buf.put_bytes(0, COMPOUND_HEADER_LEN);
        Self { start, kind }
    }

    /// Offset of the compound constructor in the buffer
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset of the first byte after the reserved header
    pub fn content_start(&self) -> usize {
        self.start + COMPOUND_HEADER_LEN
    }

    /// Back-patches the header with the number of items written since [`begin`](Self::begin)
    pub fn finish(self, buf: &mut BytesMut, count: u32) {
        let content_start = self.content_start();
        let content_len = buf.len() - content_start;
        let (code8, code32) = self.kind.codes();

        // the size field counts the count field and the content
        match (u8::try_from(content_len + 1), u8::try_from(count)) {
            (Ok(size8), Ok(count8)) => {
                buf[self.start] = code8 as u8;
                buf[self.start + 1] = size8;
                buf[self.start + 2] = count8;
                buf.copy_within(content_start.., self.start + COMPACT_HEADER_LEN);
                buf.truncate(buf.len() - (COMPOUND_HEADER_LEN - COMPACT_HEADER_LEN));
            }
            _ => {
                let size32 = (content_len + 4) as u32;
                buf[self.start] = code32 as u8;
                buf[self.start + 1..self.start + 5].copy_from_slice(&size32.to_be_bytes());
                buf[self.start + 5..self.start + 9].copy_from_slice(&count.to_be_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn integers_use_smallest_form() {
        assert_eq!(encoded(&0u32), [0x43]);
        assert_eq!(encoded(&255u32), [0x52, 0xff]);
        assert_eq!(encoded(&256u32), [0x70, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(encoded(&0u64), [0x44]);
        assert_eq!(encoded(&7u64), [0x53, 0x07]);
        assert_eq!(encoded(&-1i32), [0x54, 0xff]);
        assert_eq!(encoded(&128i32), [0x71, 0x00, 0x00, 0x00, 0x80]);
        assert_eq!(encoded(&-128i64), [0x55, 0x80]);
        assert_eq!(encoded(&i64::MIN)[0], 0x81);
    }

    #[test]
    fn booleans_use_zero_width_codes() {
        assert_eq!(encoded(&true), [0x41]);
        assert_eq!(encoded(&false), [0x42]);
    }

    #[test]
    fn compound_shrinks_to_compact_header() {
        let list = vec![1u32, 2u32];
        assert_eq!(encoded(&list), [0xc0, 0x05, 0x02, 0x52, 0x01, 0x52, 0x02]);
    }

    #[test]
    fn compound_keeps_wide_header_when_too_large() {
        let list: Vec<u64> = (0..100).map(|i| u64::MAX - i).collect();
        let buf = encoded(&list);
        assert_eq!(buf[0], 0xd0);
        let size = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(size, buf.len() - 5);
        assert_eq!(&buf[5..9], &100u32.to_be_bytes());
    }

    #[test]
    fn compound_keeps_wide_header_when_count_too_large() {
        let list: Vec<()> = vec![(); 300];
        let buf = encoded(&list);
        assert_eq!(buf[0], 0xd0);
        assert_eq!(&buf[5..9], &300u32.to_be_bytes());
    }
}
