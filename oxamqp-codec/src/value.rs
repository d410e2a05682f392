//! A generic AMQP 1.0 value

use bytes::{BufMut, Bytes, BytesMut};
use ordered_float::OrderedFloat;
use serde::{de, Deserialize, Serialize};

use crate::{
    __constants::VALUE,
    decode::{Decode, Reader},
    described::Described,
    descriptor::Descriptor,
    encode::Encode,
    format_code::EncodingCodes,
    primitives::{Array, ArrayElement, Dec128, Dec32, Dec64, OrderedMap, Symbol, Timestamp, Uuid},
    Error,
};

/// Any value of the AMQP 1.0 type system
///
/// `Value` is totally ordered and hashable (floating point values are wrapped in
/// [`OrderedFloat`]), so it can be used as a map key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// A described value
    Described(Box<Described<Value>>),

    /// Absence of a value
    #[default]
    Null,

    /// boolean
    Bool(bool),

    /// ubyte
    UByte(u8),

    /// ushort
    UShort(u16),

    /// uint
    UInt(u32),

    /// ulong
    ULong(u64),

    /// byte
    Byte(i8),

    /// short
    Short(i16),

    /// int
    Int(i32),

    /// long
    Long(i64),

    /// float
    Float(OrderedFloat<f32>),

    /// double
    Double(OrderedFloat<f64>),

    /// decimal32
    Decimal32(Dec32),

    /// decimal64
    Decimal64(Dec64),

    /// decimal128
    Decimal128(Dec128),

    /// char, a single UTF-32BE unicode character
    Char(char),

    /// timestamp
    Timestamp(Timestamp),

    /// uuid
    Uuid(Uuid),

    /// binary
    Binary(Bytes),

    /// string
    String(String),

    /// symbol
    Symbol(Symbol),

    /// list, a sequence of polymorphic values
    List(Vec<Value>),

    /// map, a polymorphic mapping from distinct keys to values
    Map(OrderedMap<Value, Value>),

    /// array, a sequence of values of a single type
    Array(Array<Value>),
}

impl Value {
    /// Whether the value is `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the AMQP type held
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Described(_) => "described",
            other => other.array_code().type_name(),
        }
    }

    /// The value as a `u32` if it is a `uint`
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a `u64` if it is a `ulong`
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::ULong(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a `&str` if it is a string or a symbol
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Symbol(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Constructor used when the value is an array element
    ///
    /// Arrays use the widest encoding of each type so that every element fits the shared
    /// constructor.
    fn array_code(&self) -> EncodingCodes {
        match self {
            Value::Described(_) => EncodingCodes::DescribedType,
            Value::Null => EncodingCodes::Null,
            Value::Bool(_) => EncodingCodes::Boolean,
            Value::UByte(_) => EncodingCodes::UByte,
            Value::UShort(_) => EncodingCodes::UShort,
            Value::UInt(_) => EncodingCodes::UInt,
            Value::ULong(_) => EncodingCodes::ULong,
            Value::Byte(_) => EncodingCodes::Byte,
            Value::Short(_) => EncodingCodes::Short,
            Value::Int(_) => EncodingCodes::Int,
            Value::Long(_) => EncodingCodes::Long,
            Value::Float(_) => EncodingCodes::Float,
            Value::Double(_) => EncodingCodes::Double,
            Value::Decimal32(_) => EncodingCodes::Decimal32,
            Value::Decimal64(_) => EncodingCodes::Decimal64,
            Value::Decimal128(_) => EncodingCodes::Decimal128,
            Value::Char(_) => EncodingCodes::Char,
            Value::Timestamp(_) => EncodingCodes::Timestamp,
            Value::Uuid(_) => EncodingCodes::Uuid,
            Value::Binary(_) => EncodingCodes::VBin32,
            Value::String(_) => EncodingCodes::Str32,
            Value::Symbol(_) => EncodingCodes::Sym32,
            Value::List(_) => EncodingCodes::List32,
            Value::Map(_) => EncodingCodes::Map32,
            Value::Array(_) => EncodingCodes::Array32,
        }
    }

    /// Writes the value without its constructor, in the form selected by `array_code`
    fn write_wide_body(&self, buf: &mut BytesMut) {
        // encodes into a scratch buffer and drops the constructor and the compact header
        fn strip(value: &impl Encode, buf: &mut BytesMut) {
            let mut scratch = BytesMut::new();
            value.encode(&mut scratch);
            buf.put_slice(&scratch[1..]);
        }

        match self {
            Value::Described(described) => {
                described.descriptor.encode(buf);
                described.value.encode(buf);
            }
            Value::Null => {}
            Value::Bool(v) => buf.put_u8(*v as u8),
            Value::UByte(v) => buf.put_u8(*v),
            Value::UShort(v) => buf.put_u16(*v),
            Value::UInt(v) => buf.put_u32(*v),
            Value::ULong(v) => buf.put_u64(*v),
            Value::Byte(v) => buf.put_i8(*v),
            Value::Short(v) => buf.put_i16(*v),
            Value::Int(v) => buf.put_i32(*v),
            Value::Long(v) => buf.put_i64(*v),
            Value::Float(v) => buf.put_f32(v.0),
            Value::Double(v) => buf.put_f64(v.0),
            Value::Decimal32(v) => strip(v, buf),
            Value::Decimal64(v) => strip(v, buf),
            Value::Decimal128(v) => strip(v, buf),
            Value::Char(v) => buf.put_u32(*v as u32),
            Value::Timestamp(v) => buf.put_i64(v.milliseconds()),
            Value::Uuid(v) => buf.put_slice(v.as_bytes()),
            Value::Binary(v) => {
                buf.put_u32(v.len() as u32);
                buf.put_slice(v);
            }
            Value::String(v) => {
                buf.put_u32(v.len() as u32);
                buf.put_slice(v.as_bytes());
            }
            Value::Symbol(v) => {
                buf.put_u32(v.len() as u32);
                buf.put_slice(v.as_bytes());
            }
            Value::List(items) => write_wide_compound(buf, items.len() as u32, |buf| {
                items.iter().for_each(|item| item.encode(buf))
            }),
            Value::Map(map) => write_wide_compound(buf, (map.len() * 2) as u32, |buf| {
                for (k, v) in map.iter() {
                    k.encode(buf);
                    v.encode(buf);
                }
            }),
            Value::Array(array) => write_wide_compound(buf, array.len() as u32, |buf| {
                let code = Value::constructor(&array.0);
                buf.put_u8(code as u8);
                array.iter().for_each(|element| element.write_wide_body(buf));
            }),
        }
    }
}

fn write_wide_compound(buf: &mut BytesMut, count: u32, content: impl FnOnce(&mut BytesMut)) {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_u32(count);
    content(buf);
    let size = (buf.len() - start - 4) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

impl Encode for Value {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Value::Described(v) => v.encode(buf),
            Value::Null => ().encode(buf),
            Value::Bool(v) => v.encode(buf),
            Value::UByte(v) => v.encode(buf),
            Value::UShort(v) => v.encode(buf),
            Value::UInt(v) => v.encode(buf),
            Value::ULong(v) => v.encode(buf),
            Value::Byte(v) => v.encode(buf),
            Value::Short(v) => v.encode(buf),
            Value::Int(v) => v.encode(buf),
            Value::Long(v) => v.encode(buf),
            Value::Float(v) => v.encode(buf),
            Value::Double(v) => v.encode(buf),
            Value::Decimal32(v) => v.encode(buf),
            Value::Decimal64(v) => v.encode(buf),
            Value::Decimal128(v) => v.encode(buf),
            Value::Char(v) => v.encode(buf),
            Value::Timestamp(v) => v.encode(buf),
            Value::Uuid(v) => v.encode(buf),
            Value::Binary(v) => v.encode(buf),
            Value::String(v) => v.encode(buf),
            Value::Symbol(v) => v.encode(buf),
            Value::List(v) => v.encode(buf),
            Value::Map(v) => v.encode(buf),
            Value::Array(v) => v.encode(buf),
        }
    }
}

impl Decode for Value {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        let (offset, code) = reader.read_code()?;
        read_body(code, offset, reader)
    }
}

/// Reads a value body written under `code`
fn read_body(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Value, Error> {
    use EncodingCodes as C;

    let value = match code {
        C::DescribedType => {
            let descriptor = Descriptor::decode(reader)?;
            let value = Value::decode(reader)?;
            Value::Described(Box::new(Described { descriptor, value }))
        }
        C::Null => Value::Null,
        C::BooleanTrue => Value::Bool(true),
        C::BooleanFalse => Value::Bool(false),
        C::Boolean => match reader.read_u8()? {
            0x00 => Value::Bool(false),
            0x01 => Value::Bool(true),
            _ => {
                return Err(Error::InvalidValue {
                    offset: offset + 1,
                    expected: "boolean",
                })
            }
        },
        C::UByte => Value::UByte(reader.read_u8()?),
        C::UShort => Value::UShort(u16::from_be_bytes(reader.read_array()?)),
        C::UInt => Value::UInt(u32::from_be_bytes(reader.read_array()?)),
        C::SmallUInt => Value::UInt(reader.read_u8()? as u32),
        C::UInt0 => Value::UInt(0),
        C::ULong => Value::ULong(u64::from_be_bytes(reader.read_array()?)),
        C::SmallULong => Value::ULong(reader.read_u8()? as u64),
        C::ULong0 => Value::ULong(0),
        C::Byte => Value::Byte(reader.read_u8()? as i8),
        C::Short => Value::Short(i16::from_be_bytes(reader.read_array()?)),
        C::Int => Value::Int(i32::from_be_bytes(reader.read_array()?)),
        C::SmallInt => Value::Int(reader.read_u8()? as i8 as i32),
        C::Long => Value::Long(i64::from_be_bytes(reader.read_array()?)),
        C::SmallLong => Value::Long(reader.read_u8()? as i8 as i64),
        C::Float => Value::Float(OrderedFloat(f32::from_be_bytes(reader.read_array()?))),
        C::Double => Value::Double(OrderedFloat(f64::from_be_bytes(reader.read_array()?))),
        C::Decimal32 => Value::Decimal32(Dec32::from(reader.read_array::<4>()?)),
        C::Decimal64 => Value::Decimal64(Dec64::from(reader.read_array::<8>()?)),
        C::Decimal128 => Value::Decimal128(Dec128::from(reader.read_array::<16>()?)),
        C::Char => {
            let value = u32::from_be_bytes(reader.read_array()?);
            let c = char::from_u32(value).ok_or(Error::InvalidChar {
                offset: offset + 1,
                value,
            })?;
            Value::Char(c)
        }
        C::Timestamp => Value::Timestamp(Timestamp::from_milliseconds(i64::from_be_bytes(
            reader.read_array()?,
        ))),
        C::Uuid => Value::Uuid(Uuid::from(reader.read_array::<16>()?)),
        C::VBin8 | C::VBin32 => Value::Binary(reader.read_variable(code)?),
        C::Str8 | C::Str32 => Value::String(reader.read_string_body(code)?),
        C::Sym8 | C::Sym32 => Value::Symbol(Symbol::decode_element(code, offset, reader)?),
        C::List0 | C::List8 | C::List32 => {
            let header = reader.read_compound_header(code, offset)?;
            let mut items = Vec::with_capacity((header.count as usize).min(reader.remaining()));
            for _ in 0..header.count {
                items.push(Value::decode(reader)?);
            }
            reader.expect_end(header.end, offset)?;
            Value::List(items)
        }
        C::Map8 | C::Map32 => {
            let header = reader.read_compound_header(code, offset)?;
            if header.count % 2 != 0 {
                return Err(Error::LengthMismatch { offset });
            }
            let mut map = OrderedMap::new();
            for _ in 0..header.count / 2 {
                let key = Value::decode(reader)?;
                let value = Value::decode(reader)?;
                map.insert(key, value);
            }
            reader.expect_end(header.end, offset)?;
            Value::Map(map)
        }
        C::Array8 | C::Array32 => {
            let header = reader.read_compound_header(code, offset)?;
            let (ctor_offset, ctor) = reader.read_code()?;
            let mut elements = Vec::with_capacity((header.count as usize).min(reader.remaining()));
            for _ in 0..header.count {
                elements.push(read_body(ctor, ctor_offset, reader)?);
            }
            reader.expect_end(header.end, offset)?;
            Value::Array(Array(elements))
        }
    };
    Ok(value)
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Described(v) => v.serialize(serializer),
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::UByte(v) => serializer.serialize_u8(*v),
            Value::UShort(v) => serializer.serialize_u16(*v),
            Value::UInt(v) => serializer.serialize_u32(*v),
            Value::ULong(v) => serializer.serialize_u64(*v),
            Value::Byte(v) => serializer.serialize_i8(*v),
            Value::Short(v) => serializer.serialize_i16(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::Long(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f32(v.0),
            Value::Double(v) => serializer.serialize_f64(v.0),
            Value::Decimal32(v) => v.serialize(serializer),
            Value::Decimal64(v) => v.serialize(serializer),
            Value::Decimal128(v) => v.serialize(serializer),
            Value::Char(v) => serializer.serialize_char(*v),
            Value::Timestamp(v) => v.serialize(serializer),
            Value::Uuid(v) => v.serialize(serializer),
            Value::Binary(v) => serializer.serialize_bytes(v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Symbol(v) => v.serialize(serializer),
            Value::List(v) => serializer.collect_seq(v),
            Value::Map(v) => v.serialize(serializer),
            Value::Array(v) => v.serialize(serializer),
        }
    }
}

struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an encoded AMQP value")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        let mut reader = Reader::new(Bytes::copy_from_slice(v));
        Value::decode(&mut reader).map_err(E::custom)
    }
}

/// The deserializer hands over the encoded value, which is then decoded in one pass
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(VALUE, Visitor)
    }
}

impl ArrayElement for Value {
    fn constructor(elements: &[Self]) -> EncodingCodes {
        elements
            .first()
            .map(Value::array_code)
            .unwrap_or(EncodingCodes::Null)
    }

    /// Elements whose own type differs from `code` are not converted
    fn encode_element(&self, _code: EncodingCodes, buf: &mut BytesMut) {
        self.write_wide_body(buf)
    }

    fn decode_element(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        read_body(code, offset, reader)
    }
}

impl Array<Value> {
    /// Checks that every element shares the constructor of the first one
    pub fn try_from_values(values: Vec<Value>) -> Result<Self, Error> {
        let expected = Value::constructor(&values);
        match values.iter().all(|v| v.array_code() == expected) {
            true => Ok(Self(values)),
            false => Err(Error::HeterogeneousArray { expected }),
        }
    }
}

macro_rules! impl_from_for_value {
    ($($variant:ident: $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(val: $ty) -> Self {
                    Value::$variant(val)
                }
            }
        )*
    };
}

impl_from_for_value! {
    Bool: bool,
    UByte: u8,
    UShort: u16,
    UInt: u32,
    ULong: u64,
    Byte: i8,
    Short: i16,
    Int: i32,
    Long: i64,
    Float: OrderedFloat<f32>,
    Double: OrderedFloat<f64>,
    Decimal32: Dec32,
    Decimal64: Dec64,
    Decimal128: Dec128,
    Char: char,
    Timestamp: Timestamp,
    Uuid: Uuid,
    Binary: Bytes,
    String: String,
    Symbol: Symbol,
    List: Vec<Value>,
    Map: OrderedMap<Value, Value>,
    Array: Array<Value>,
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        Value::Float(OrderedFloat(val))
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::Double(OrderedFloat(val))
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::String(val.to_string())
    }
}

impl From<Described<Value>> for Value {
    fn from(val: Described<Value>) -> Self {
        Value::Described(Box::new(val))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        val.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_slice, to_bytes};

    fn round_trip(value: Value) -> Vec<u8> {
        let buf = to_bytes(&value).unwrap();
        let decoded: Value = from_slice(&buf).unwrap();
        assert_eq!(decoded, value, "bytes: {:02x?}", &buf[..]);
        buf.to_vec()
    }

    #[test]
    fn boundary_values_round_trip() {
        assert_eq!(round_trip(Value::Null), [0x40]);
        assert_eq!(round_trip(Value::UInt(0)), [0x43]);
        assert_eq!(round_trip(Value::ULong(0)), [0x44]);
        assert_eq!(round_trip(Value::UInt(u32::MAX)), [0x70, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(round_trip(Value::Int(i32::MIN))[0], 0x71);
        assert_eq!(round_trip(Value::Int(127)), [0x54, 0x7f]);
        assert_eq!(round_trip(Value::Long(-128)), [0x55, 0x80]);
        assert_eq!(round_trip(Value::UByte(u8::MAX)), [0x50, 0xff]);
        assert_eq!(round_trip(Value::UShort(0x1234)), [0x60, 0x12, 0x34]);
        assert_eq!(round_trip(Value::Byte(i8::MIN)), [0x51, 0x80]);
        assert_eq!(round_trip(Value::Short(-2)), [0x61, 0xff, 0xfe]);
        assert_eq!(round_trip(Value::from(1.5f32))[0], 0x72);
        assert_eq!(round_trip(Value::from(-0.25f64))[0], 0x82);
        assert_eq!(round_trip(Value::Char('é')), [0x73, 0x00, 0x00, 0x00, 0xe9]);
        assert_eq!(round_trip(Value::Timestamp(Timestamp::from_milliseconds(1)))[0], 0x83);
        assert_eq!(round_trip(Value::Uuid(Uuid::from([7u8; 16]))).len(), 17);
        assert_eq!(round_trip(Value::Decimal32(Dec32::from([1, 2, 3, 4])))[0], 0x74);
        assert_eq!(round_trip(Value::Decimal64(Dec64::from([9; 8])))[0], 0x84);
        assert_eq!(round_trip(Value::Decimal128(Dec128::from([3; 16])))[0], 0x94);
    }

    #[test]
    fn empty_values_round_trip() {
        assert_eq!(round_trip(Value::String(String::new())), [0xa1, 0x00]);
        assert_eq!(round_trip(Value::Binary(Bytes::new())), [0xa0, 0x00]);
        assert_eq!(round_trip(Value::Symbol(Symbol::default())), [0xa3, 0x00]);
        assert_eq!(round_trip(Value::List(vec![])), [0x45]);
        assert_eq!(round_trip(Value::Map(OrderedMap::new())), [0xc1, 0x01, 0x00]);
    }

    #[test]
    fn long_string_uses_str32() {
        let s = "a".repeat(256);
        let buf = round_trip(Value::String(s));
        assert_eq!(&buf[..5], &[0xb1, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn nested_compound_round_trip() {
        let mut map = OrderedMap::new();
        map.insert(Value::from("key"), Value::List(vec![Value::Bool(true), Value::Null]));
        map.insert(Value::UInt(3), Value::Binary(Bytes::from_static(b"\x00\x01")));
        round_trip(Value::Map(map));
    }

    #[test]
    fn value_array_uses_wide_element_form() {
        let array = Array::try_from_values(vec![Value::UInt(1), Value::UInt(300)]).unwrap();
        let buf = round_trip(Value::Array(array));
        assert_eq!(&buf[..4], &[0xe0, 0x0a, 0x02, 0x70]);
    }

    #[test]
    fn heterogeneous_array_is_rejected() {
        let err = Array::try_from_values(vec![Value::UInt(1), Value::from("x")]).unwrap_err();
        assert_eq!(
            err,
            Error::HeterogeneousArray {
                expected: EncodingCodes::UInt
            }
        );
    }

    #[test]
    fn array_of_lists_round_trip() {
        let array = Array::try_from_values(vec![
            Value::List(vec![Value::UInt(1)]),
            Value::List(vec![]),
        ])
        .unwrap();
        round_trip(Value::Array(array));
    }

    #[test]
    fn compact_array_elements_decode() {
        // array8 of two smalluint elements
        let value: Value = from_slice(&[0xe0, 0x04, 0x02, 0x52, 0x05, 0x06]).unwrap();
        assert_eq!(
            value,
            Value::Array(Array(vec![Value::UInt(5), Value::UInt(6)]))
        );
    }
}
