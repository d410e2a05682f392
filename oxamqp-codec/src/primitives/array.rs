use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de, Deserialize, Serialize};

use crate::{
    __constants::ARRAY,
    decode::{Decode, Reader},
    encode::{CompoundKind, CompoundWriter, Encode},
    format_code::EncodingCodes,
    Error,
};

/// Types that can be packed into an AMQP array
///
/// All elements of an array share one constructor which is written once before the first
/// element, so an element is written and read without its own format code.
pub trait ArrayElement: Sized {
    /// Selects the constructor shared by `elements`
    fn constructor(elements: &[Self]) -> EncodingCodes;

    /// Writes the element body under the shared constructor `code`
    fn encode_element(&self, code: EncodingCodes, buf: &mut BytesMut);

    /// Reads one element body written under `code`, `offset` being the offset of the constructor
    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader)
        -> Result<Self, Error>;
}

/// A sequence of values of a single type
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Array<T>(pub Vec<T>);

impl<T> Array<T> {
    /// Creates an empty array
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the array is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterator over the elements
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    /// Consumes the array and returns the inner `Vec`
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T: PartialEq> Array<T> {
    /// Whether the array holds `item`
    pub fn contains(&self, item: &T) -> bool {
        self.0.contains(item)
    }
}

impl<T> From<Vec<T>> for Array<T> {
    fn from(val: Vec<T>) -> Self {
        Self(val)
    }
}

impl<T> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Array<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T: ArrayElement> Encode for Array<T> {
    fn encode(&self, buf: &mut BytesMut) {
        let code = T::constructor(&self.0);
        let writer = CompoundWriter::begin(buf, CompoundKind::Array);
        buf.put_u8(code as u8);
        for element in &self.0 {
            element.encode_element(code, buf);
        }
        writer.finish(buf, self.0.len() as u32);
    }
}

impl<T: ArrayElement> Decode for Array<T> {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        let (offset, code) = reader.read_code()?;
        match code {
            EncodingCodes::Array8 | EncodingCodes::Array32 => {
                let header = reader.read_compound_header(code, offset)?;
                let (ctor_offset, ctor) = reader.read_code()?;
                // each element takes at least one byte unless its width is zero
                let mut elements = Vec::with_capacity((header.count as usize).min(reader.remaining()));
                for _ in 0..header.count {
                    elements.push(T::decode_element(ctor, ctor_offset, reader)?);
                }
                reader.expect_end(header.end, offset)?;
                Ok(Self(elements))
            }
            found => Err(Error::TypeMismatch {
                offset,
                expected: "array",
                found,
            }),
        }
    }
}

/// The array is handed to the serializer already encoded
impl<T: ArrayElement> Serialize for Array<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        serializer.serialize_newtype_struct(ARRAY, serde_bytes::Bytes::new(&buf))
    }
}

struct Visitor<T>(PhantomData<T>);

impl<'de, T: ArrayElement> de::Visitor<'de> for Visitor<T> {
    type Value = Array<T>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("array")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        let mut reader = Reader::new(Bytes::copy_from_slice(v));
        Array::decode(&mut reader).map_err(E::custom)
    }
}

/// A field declared with `multiple="true"` also accepts a single value in place of the array
impl<'de, T: ArrayElement> Deserialize<'de> for Array<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(ARRAY, Visitor(PhantomData))
    }
}

macro_rules! fixed_array_element {
    ($ty:ty, $code:ident, $put:ident, $label:literal) => {
        impl ArrayElement for $ty {
            fn constructor(_: &[Self]) -> EncodingCodes {
                EncodingCodes::$code
            }

            fn encode_element(&self, _: EncodingCodes, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn decode_element(
                code: EncodingCodes,
                offset: usize,
                reader: &mut Reader,
            ) -> Result<Self, Error> {
                match code {
                    EncodingCodes::$code => Ok(<$ty>::from_be_bytes(reader.read_array()?)),
                    found => Err(Error::TypeMismatch {
                        offset,
                        expected: $label,
                        found,
                    }),
                }
            }
        }
    };
}

fixed_array_element!(u8, UByte, put_u8, "ubyte");
fixed_array_element!(u16, UShort, put_u16, "ushort");
fixed_array_element!(i8, Byte, put_i8, "byte");
fixed_array_element!(i16, Short, put_i16, "short");
fixed_array_element!(i64, Long, put_i64, "long");

impl ArrayElement for u32 {
    fn constructor(_: &[Self]) -> EncodingCodes {
        EncodingCodes::UInt
    }

    fn encode_element(&self, _: EncodingCodes, buf: &mut BytesMut) {
        buf.put_u32(*self);
    }

    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        match code {
            EncodingCodes::UInt => Ok(u32::from_be_bytes(reader.read_array()?)),
            EncodingCodes::SmallUInt => Ok(reader.read_u8()? as u32),
            EncodingCodes::UInt0 => Ok(0),
            found => Err(Error::TypeMismatch {
                offset,
                expected: "uint",
                found,
            }),
        }
    }
}

impl ArrayElement for u64 {
    fn constructor(_: &[Self]) -> EncodingCodes {
        EncodingCodes::ULong
    }

    fn encode_element(&self, _: EncodingCodes, buf: &mut BytesMut) {
        buf.put_u64(*self);
    }

    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        match code {
            EncodingCodes::ULong => Ok(u64::from_be_bytes(reader.read_array()?)),
            EncodingCodes::SmallULong => Ok(reader.read_u8()? as u64),
            EncodingCodes::ULong0 => Ok(0),
            found => Err(Error::TypeMismatch {
                offset,
                expected: "ulong",
                found,
            }),
        }
    }
}

impl ArrayElement for i32 {
    fn constructor(_: &[Self]) -> EncodingCodes {
        EncodingCodes::Int
    }

    fn encode_element(&self, _: EncodingCodes, buf: &mut BytesMut) {
        buf.put_i32(*self);
    }

    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        match code {
            EncodingCodes::Int => Ok(i32::from_be_bytes(reader.read_array()?)),
            EncodingCodes::SmallInt => Ok(reader.read_u8()? as i8 as i32),
            found => Err(Error::TypeMismatch {
                offset,
                expected: "int",
                found,
            }),
        }
    }
}

impl ArrayElement for bool {
    fn constructor(_: &[Self]) -> EncodingCodes {
        EncodingCodes::Boolean
    }

    fn encode_element(&self, _: EncodingCodes, buf: &mut BytesMut) {
        buf.put_u8(*self as u8);
    }

    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        match code {
            EncodingCodes::Boolean => match reader.read_u8()? {
                0x00 => Ok(false),
                0x01 => Ok(true),
                _ => Err(Error::InvalidValue {
                    offset: reader.position() - 1,
                    expected: "boolean",
                }),
            },
            EncodingCodes::BooleanTrue => Ok(true),
            EncodingCodes::BooleanFalse => Ok(false),
            found => Err(Error::TypeMismatch {
                offset,
                expected: "boolean",
                found,
            }),
        }
    }
}

impl ArrayElement for String {
    fn constructor(elements: &[Self]) -> EncodingCodes {
        if elements.iter().all(|s| s.len() <= u8::MAX as usize) {
            EncodingCodes::Str8
        } else {
            EncodingCodes::Str32
        }
    }

    fn encode_element(&self, code: EncodingCodes, buf: &mut BytesMut) {
        match code {
            EncodingCodes::Str8 => buf.put_u8(self.len() as u8),
            _ => buf.put_u32(self.len() as u32),
        }
        buf.put_slice(self.as_bytes());
    }

    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        match code {
            EncodingCodes::Str8 | EncodingCodes::Str32 => reader.read_string_body(code),
            found => Err(Error::TypeMismatch {
                offset,
                expected: "string",
                found,
            }),
        }
    }
}
