//! Serializer

use bytes::{BufMut, Bytes, BytesMut};
use serde::ser::{self, Serialize};

use crate::{
    __constants::{
        ARRAY, DECIMAL128, DECIMAL32, DECIMAL64, DESCRIBED_BASIC, DESCRIBED_LIST, DESCRIPTOR,
        SYMBOL, TIMESTAMP, UUID,
    },
    encode::{put_variable, CompoundKind, CompoundWriter, Encode},
    format_code::EncodingCodes,
    Error,
};

/// Serializes `value` into a new buffer
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    to_buf(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Appends the encoding of `value` to `buf`
pub fn to_buf<T: Serialize + ?Sized>(value: &T, buf: &mut BytesMut) -> Result<(), Error> {
    let mut serializer = Serializer::new(buf);
    value.serialize(&mut serializer)
}

/// Encoding selected by the name of the newtype being serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewType {
    None,
    Symbol,
    Timestamp,
    Uuid,
    Dec32,
    Dec64,
    Dec128,
    /// The bytes are an already encoded value and are copied verbatim
    Encoded,
}

impl NewType {
    fn from_name(name: &str) -> Self {
        match name {
            SYMBOL => NewType::Symbol,
            TIMESTAMP => NewType::Timestamp,
            UUID => NewType::Uuid,
            DECIMAL32 => NewType::Dec32,
            DECIMAL64 => NewType::Dec64,
            DECIMAL128 => NewType::Dec128,
            ARRAY => NewType::Encoded,
            _ => NewType::None,
        }
    }
}

/// A serializer for the AMQP 1.0 type system
///
/// Integers take their smallest encoding, lists and maps the 8-bit size and count whenever both
/// fit, and a struct named [`DESCRIBED_LIST`] becomes a described list whose first field is the
/// descriptor.
#[derive(Debug)]
pub struct Serializer<'a> {
    buf: &'a mut BytesMut,
    newtype: NewType,
}

impl<'a> Serializer<'a> {
    /// Creates a serializer appending to `buf`
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self {
            buf,
            newtype: NewType::None,
        }
    }

    fn take_newtype(&mut self) -> NewType {
        std::mem::replace(&mut self.newtype, NewType::None)
    }

    fn put_fixed(&mut self, code: EncodingCodes, bytes: &[u8], width: usize) -> Result<(), Error> {
        if bytes.len() != width {
            return Err(ser::Error::custom(format!(
                "{} takes {} bytes, found {}",
                code.type_name(),
                width,
                bytes.len()
            )));
        }
        self.buf.put_u8(code as u8);
        self.buf.put_slice(bytes);
        Ok(())
    }
}

macro_rules! encode_primitive {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<Self::Ok, Self::Error> {
                self.newtype = NewType::None;
                v.encode(self.buf);
                Ok(())
            }
        )*
    };
}

impl<'a, 'b> ser::Serializer for &'b mut Serializer<'a> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Compound<'a, 'b>;
    type SerializeTuple = Compound<'a, 'b>;
    type SerializeTupleStruct = Compound<'a, 'b>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;
    type SerializeMap = Compound<'a, 'b>;
    type SerializeStruct = Compound<'a, 'b>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    encode_primitive! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
    }

    fn serialize_i64(self, v: i64) -> Result<Self::Ok, Self::Error> {
        match self.take_newtype() {
            NewType::Timestamp => {
                self.buf.put_u8(EncodingCodes::Timestamp as u8);
                self.buf.put_i64(v);
            }
            _ => v.encode(self.buf),
        }
        Ok(())
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        match self.take_newtype() {
            NewType::Symbol => put_variable(
                self.buf,
                EncodingCodes::Sym8,
                EncodingCodes::Sym32,
                v.as_bytes(),
            ),
            _ => v.encode(self.buf),
        }
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        match self.take_newtype() {
            NewType::Uuid => self.put_fixed(EncodingCodes::Uuid, v, 16)?,
            NewType::Dec32 => self.put_fixed(EncodingCodes::Decimal32, v, 4)?,
            NewType::Dec64 => self.put_fixed(EncodingCodes::Decimal64, v, 8)?,
            NewType::Dec128 => self.put_fixed(EncodingCodes::Decimal128, v, 16)?,
            NewType::Encoded => self.buf.put_slice(v),
            _ => put_variable(self.buf, EncodingCodes::VBin8, EncodingCodes::VBin32, v),
        }
        Ok(())
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        self.serialize_unit()
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        self.newtype = NewType::None;
        self.buf.put_u8(EncodingCodes::Null as u8);
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Err(ser::Error::custom(format!(
            "{}::{} has no AMQP encoding",
            name, variant
        )))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        self.newtype = NewType::from_name(name);
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(Compound::list(self))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Ok(Compound::list(self))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        match name {
            DESCRIBED_BASIC => Ok(Compound::described_basic(self)),
            DESCRIBED_LIST => Ok(Compound::described_list(self)),
            _ => Ok(Compound::list(self)),
        }
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(ser::Error::custom(format!(
            "{}::{} has no AMQP encoding",
            name, variant
        )))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        self.newtype = NewType::None;
        let writer = CompoundWriter::begin(self.buf, CompoundKind::Map);
        Ok(Compound {
            se: self,
            kind: Kind::Map { writer, count: 0 },
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        match name {
            DESCRIBED_LIST => Ok(Compound::described_list(self)),
            _ => Ok(Compound::list(self)),
        }
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(ser::Error::custom(format!(
            "{}::{} has no AMQP encoding",
            name, variant
        )))
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

#[derive(Debug)]
enum Kind {
    List {
        writer: CompoundWriter,
        count: u32,
    },
    Map {
        writer: CompoundWriter,
        count: u32,
    },
    /// Descriptor followed by a single value
    DescribedBasic,
    /// Descriptor followed by a list of fields, the list starts once the descriptor is written
    DescribedList {
        writer: Option<CompoundWriter>,
        count: u32,
    },
}

/// Serializer of lists, maps and described values
#[derive(Debug)]
pub struct Compound<'a, 'b> {
    se: &'b mut Serializer<'a>,
    kind: Kind,
}

impl<'a, 'b> Compound<'a, 'b> {
    fn list(se: &'b mut Serializer<'a>) -> Self {
        se.newtype = NewType::None;
        let writer = CompoundWriter::begin(se.buf, CompoundKind::List);
        Self {
            se,
            kind: Kind::List { writer, count: 0 },
        }
    }

    fn described_basic(se: &'b mut Serializer<'a>) -> Self {
        se.newtype = NewType::None;
        se.buf.put_u8(EncodingCodes::DescribedType as u8);
        Self {
            se,
            kind: Kind::DescribedBasic,
        }
    }

    fn described_list(se: &'b mut Serializer<'a>) -> Self {
        se.newtype = NewType::None;
        se.buf.put_u8(EncodingCodes::DescribedType as u8);
        Self {
            se,
            kind: Kind::DescribedList {
                writer: None,
                count: 0,
            },
        }
    }

    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        value.serialize(&mut *self.se)?;
        match &mut self.kind {
            Kind::List { count, .. } | Kind::Map { count, .. } => *count += 1,
            Kind::DescribedBasic => {}
            Kind::DescribedList { writer, count } => match writer {
                Some(_) => *count += 1,
                // the first element is the descriptor
                None => *writer = Some(CompoundWriter::begin(self.se.buf, CompoundKind::List)),
            },
        }
        Ok(())
    }

    fn finish(self) -> Result<(), Error> {
        let buf = &mut *self.se.buf;
        match self.kind {
            Kind::List { writer, count } => finish_list(buf, writer, count),
            Kind::Map { writer, count } => writer.finish(buf, count),
            Kind::DescribedBasic => {}
            Kind::DescribedList { writer, count } => match writer {
                Some(writer) => finish_list(buf, writer, count),
                None => return Err(ser::Error::custom("described list without descriptor")),
            },
        }
        Ok(())
    }
}

/// A list without items is written as `list0`
fn finish_list(buf: &mut BytesMut, writer: CompoundWriter, count: u32) {
    if count == 0 {
        buf.truncate(writer.start());
        buf.put_u8(EncodingCodes::List0 as u8);
    } else {
        writer.finish(buf, count);
    }
}

impl<'a, 'b> ser::SerializeSeq for Compound<'a, 'b> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Error> {
        self.finish()
    }
}

impl<'a, 'b> ser::SerializeTuple for Compound<'a, 'b> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Error> {
        self.finish()
    }
}

impl<'a, 'b> ser::SerializeTupleStruct for Compound<'a, 'b> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Error> {
        self.finish()
    }
}

impl<'a, 'b> ser::SerializeMap for Compound<'a, 'b> {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Error> {
        self.element(key)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Error> {
        self.finish()
    }
}

impl<'a, 'b> ser::SerializeStruct for Compound<'a, 'b> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        if let Kind::DescribedList { writer: Some(_), .. } = self.kind {
            if key == DESCRIPTOR {
                return Err(ser::Error::custom("descriptor must be the first field"));
            }
        }
        self.element(value)
    }

    fn end(self) -> Result<(), Error> {
        self.finish()
    }
}
