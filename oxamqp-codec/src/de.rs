//! Deserializer

use bytes::Bytes;
use serde::de::{self, DeserializeOwned, DeserializeSeed, Visitor};

use crate::{
    __constants::{
        ARRAY, DECIMAL128, DECIMAL32, DECIMAL64, DESCRIBED_BASIC, DESCRIBED_LIST, DESCRIPTOR,
        SYMBOL, TIMESTAMP, UUID, VALUE,
    },
    decode::{Decode, Reader},
    descriptor::Descriptor,
    format_code::EncodingCodes,
    primitives::{Dec128, Dec32, Dec64, Symbol, Timestamp, Uuid},
    value::Value,
    Error,
};

/// Deserializes one value from the start of `buf`, ignoring any trailing bytes
pub fn from_slice<T: DeserializeOwned>(buf: &[u8]) -> Result<T, Error> {
    from_bytes(Bytes::copy_from_slice(buf))
}

/// Deserializes one value from `buf`
pub fn from_bytes<T: DeserializeOwned>(buf: Bytes) -> Result<T, Error> {
    let mut reader = Reader::new(buf);
    from_reader(&mut reader)
}

/// Deserializes the next value of `reader`, leaving the reader right after it
pub fn from_reader<T: DeserializeOwned>(reader: &mut Reader) -> Result<T, Error> {
    from_reader_with_presence(reader).map(|(value, _)| value)
}

/// Deserializes a described list along with the set of its fields that carried a value
pub fn from_reader_with_presence<T: DeserializeOwned>(
    reader: &mut Reader,
) -> Result<(T, FieldPresence), Error> {
    let offset = reader.position();
    let mut de = Deserializer::new(reader);
    let value = T::deserialize(&mut de).map_err(|err| err.located(offset))?;
    Ok((value, de.presence))
}

/// Fields of a described list that were present, i.e. neither omitted nor `null`, on the wire
///
/// Only the outermost described list is tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldPresence(u32);

impl FieldPresence {
    /// Whether the field at `index` carried a value
    pub fn has_field(&self, index: usize) -> bool {
        index < 32 && self.0 & (1 << index) != 0
    }

    /// Raw bit mask, bit `i` set for field `i`
    pub fn bits(&self) -> u32 {
        self.0
    }

    fn set(&mut self, index: u32) {
        if index < 32 {
            self.0 |= 1 << index;
        }
    }
}

/// A deserializer for the AMQP 1.0 type system
///
/// Primitive types are read strictly: a `u32` is only read from a `uint` encoding, never from
/// a `ulong`. Binaries read out of the deserializer are copied, payloads that must stay
/// zero-copy are split off the [`Reader`] directly.
#[derive(Debug)]
pub struct Deserializer<'r> {
    reader: &'r mut Reader,
    /// The next value is a field of a described list
    field: bool,
    /// Descriptor presented for the next described list instead of the one on the wire
    resolved: Option<Descriptor>,
    depth: u32,
    presence: FieldPresence,
}

impl<'r> Deserializer<'r> {
    /// Creates a deserializer reading from the current position of `reader`
    pub fn new(reader: &'r mut Reader) -> Self {
        Self {
            reader,
            field: false,
            resolved: None,
            depth: 0,
            presence: FieldPresence::default(),
        }
    }

    /// Creates a deserializer whose next described list is identified by `descriptor`
    ///
    /// This lets a descriptor that was resolved through an alias reach a type that only
    /// recognizes its own name and code.
    pub fn resolving(reader: &'r mut Reader, descriptor: Descriptor) -> Self {
        let mut de = Self::new(reader);
        de.resolved = Some(descriptor);
        de
    }

    /// Fields present in the outermost described list read so far
    pub fn presence(&self) -> FieldPresence {
        self.presence
    }

    fn read<T: Decode>(&mut self) -> Result<T, Error> {
        self.field = false;
        T::decode(self.reader)
    }

    /// Checks the next value and returns its encoding
    fn read_encoded(&mut self) -> Result<Bytes, Error> {
        self.field = false;
        let start = self.reader.position();
        Value::decode(self.reader)?;
        Ok(self.reader.slice_from(start))
    }

    fn read_array<'de, V: Visitor<'de>>(&mut self, visitor: V) -> Result<V::Value, Error> {
        let field = self.field;
        let offset = self.reader.position();
        let code = self.reader.peek_code()?;
        let encoded = self.read_encoded()?;
        match code {
            EncodingCodes::Array8 | EncodingCodes::Array32 => visitor.visit_bytes(&encoded),
            // a field declared with `multiple="true"` may hold a single value, whose encoding is
            // also the constructor and the body of the only element of an array
            _ if field => {
                let mut array = Vec::with_capacity(encoded.len() + 9);
                array.push(EncodingCodes::Array32 as u8);
                array.extend_from_slice(&(encoded.len() as u32 + 4).to_be_bytes());
                array.extend_from_slice(&1u32.to_be_bytes());
                array.extend_from_slice(&encoded);
                visitor.visit_byte_buf(array)
            }
            found => Err(Error::TypeMismatch {
                offset,
                expected: "array",
                found,
            }),
        }
    }

    fn read_list_header(&mut self) -> Result<(usize, crate::decode::CompoundHeader), Error> {
        let (offset, code) = self.reader.read_code()?;
        match code {
            EncodingCodes::List0 | EncodingCodes::List8 | EncodingCodes::List32 => {
                let header = self.reader.read_compound_header(code, offset)?;
                Ok((offset, header))
            }
            found => Err(Error::TypeMismatch {
                offset,
                expected: "list",
                found,
            }),
        }
    }

    fn read_described_list<'de, V: Visitor<'de>>(
        &mut self,
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.field = false;
        let (offset, descriptor) = self.reader.read_descriptor()?;
        let descriptor = self.resolved.take().unwrap_or(descriptor);
        let (list_offset, header) = self.read_list_header()?;

        self.depth += 1;
        let track = self.depth == 1;
        let mut access = DescribedListAccess {
            de: self,
            descriptor: Some(descriptor),
            remaining: header.count,
            index: 0,
            track,
        };
        let value = visitor
            .visit_seq(&mut access)
            .map_err(|err| err.located(offset))?;
        // fields added by a later revision of the type are skipped
        while access.remaining > 0 {
            access.remaining -= 1;
            access.de.reader.skip_value()?;
        }
        self.reader.expect_end(header.end, list_offset)?;
        self.depth -= 1;
        Ok(value)
    }
}

impl<'de, 'a, 'r> de::Deserializer<'de> for &'a mut Deserializer<'r> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        use EncodingCodes as C;

        match self.reader.peek_code()? {
            C::DescribedType => self.deserialize_tuple_struct(DESCRIBED_BASIC, 2, visitor),
            C::Null => self.deserialize_unit(visitor),
            C::Boolean | C::BooleanTrue | C::BooleanFalse => self.deserialize_bool(visitor),
            C::UByte => self.deserialize_u8(visitor),
            C::UShort => self.deserialize_u16(visitor),
            C::UInt | C::SmallUInt | C::UInt0 => self.deserialize_u32(visitor),
            C::ULong | C::SmallULong | C::ULong0 => self.deserialize_u64(visitor),
            C::Byte => self.deserialize_i8(visitor),
            C::Short => self.deserialize_i16(visitor),
            C::Int | C::SmallInt => self.deserialize_i32(visitor),
            C::Long | C::SmallLong => self.deserialize_i64(visitor),
            C::Float => self.deserialize_f32(visitor),
            C::Double => self.deserialize_f64(visitor),
            C::Char => self.deserialize_char(visitor),
            C::Timestamp => self.deserialize_newtype_struct(TIMESTAMP, visitor),
            C::Uuid => self.deserialize_newtype_struct(UUID, visitor),
            C::Decimal32 => self.deserialize_newtype_struct(DECIMAL32, visitor),
            C::Decimal64 => self.deserialize_newtype_struct(DECIMAL64, visitor),
            C::Decimal128 => self.deserialize_newtype_struct(DECIMAL128, visitor),
            C::VBin8 | C::VBin32 => self.deserialize_byte_buf(visitor),
            C::Str8 | C::Str32 => self.deserialize_string(visitor),
            C::Sym8 | C::Sym32 => self.deserialize_newtype_struct(SYMBOL, visitor),
            C::List0 | C::List8 | C::List32 => self.deserialize_seq(visitor),
            C::Map8 | C::Map32 => self.deserialize_map(visitor),
            C::Array8 | C::Array32 => self.read_array(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bool(self.read()?)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_i8(self.read()?)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_i16(self.read()?)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_i32(self.read()?)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_i64(self.read()?)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_u8(self.read()?)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_u16(self.read()?)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_u32(self.read()?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_u64(self.read()?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f32(self.read()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f64(self.read()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_char(self.read()?)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.read()?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let bytes: Bytes = self.read()?;
        visitor.visit_byte_buf(bytes.to_vec())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.reader.next_is_null() {
            self.read::<()>()?;
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.read::<()>()?;
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match name {
            SYMBOL => visitor.visit_string(self.read::<Symbol>()?.into_inner()),
            TIMESTAMP => visitor.visit_i64(self.read::<Timestamp>()?.milliseconds()),
            UUID => visitor.visit_bytes(self.read::<Uuid>()?.as_bytes()),
            DECIMAL32 => visitor.visit_bytes(&self.read::<Dec32>()?.into_inner()),
            DECIMAL64 => visitor.visit_bytes(&self.read::<Dec64>()?.into_inner()),
            DECIMAL128 => visitor.visit_bytes(&self.read::<Dec128>()?.into_inner()),
            DESCRIPTOR => match self.read::<Descriptor>()? {
                Descriptor::Name(name) => visitor.visit_string(name.into_inner()),
                Descriptor::Code(code) => visitor.visit_u64(code),
            },
            VALUE => visitor.visit_bytes(&self.read_encoded()?),
            ARRAY => self.read_array(visitor),
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.field = false;
        let (offset, header) = self.read_list_header()?;
        let mut access = ListAccess {
            de: self,
            remaining: header.count,
        };
        let value = visitor.visit_seq(&mut access)?;
        while access.remaining > 0 {
            access.remaining -= 1;
            access.de.reader.skip_value()?;
        }
        self.reader.expect_end(header.end, offset)?;
        Ok(value)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match name {
            DESCRIBED_BASIC => {
                self.field = false;
                let (offset, descriptor) = self.reader.read_descriptor()?;
                visitor
                    .visit_seq(DescribedBasicAccess {
                        de: self,
                        descriptor: Some(descriptor),
                        value_read: false,
                    })
                    .map_err(|err| err.located(offset))
            }
            DESCRIBED_LIST => self.read_described_list(visitor),
            _ => self.deserialize_seq(visitor),
        }
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.field = false;
        let (offset, code) = self.reader.read_code()?;
        let header = match code {
            EncodingCodes::Map8 | EncodingCodes::Map32 => {
                self.reader.read_compound_header(code, offset)?
            }
            found => {
                return Err(Error::TypeMismatch {
                    offset,
                    expected: "map",
                    found,
                })
            }
        };
        if header.count % 2 != 0 {
            return Err(Error::LengthMismatch { offset });
        }
        let mut access = MapAccess {
            de: self,
            remaining: header.count / 2,
        };
        let value = visitor.visit_map(&mut access)?;
        while access.remaining > 0 {
            access.remaining -= 1;
            access.de.reader.skip_value()?;
            access.de.reader.skip_value()?;
        }
        self.reader.expect_end(header.end, offset)?;
        Ok(value)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match name {
            DESCRIBED_LIST => self.read_described_list(visitor),
            _ => self.deserialize_seq(visitor),
        }
    }

    /// The variant is selected by the descriptor of the described value that follows
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.field = false;
        let offset = self.reader.position();
        let descriptor = self.reader.peek_descriptor()?;
        visitor
            .visit_enum(DescribedEnumAccess {
                de: self,
                descriptor,
            })
            .map_err(|err| err.located(offset))
    }

    fn deserialize_identifier<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.reader.peek_code()? {
            EncodingCodes::Str8 | EncodingCodes::Str32 => self.deserialize_string(visitor),
            _ => self.deserialize_newtype_struct(DESCRIPTOR, visitor),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.field = false;
        self.reader.skip_value()?;
        visitor.visit_unit()
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

/// Hands a descriptor that was already read to a `Deserialize` implementation
struct DescriptorDeserializer(Descriptor);

impl<'de> de::Deserializer<'de> for DescriptorDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Descriptor::Name(name) => visitor.visit_string(name.into_inner()),
            Descriptor::Code(code) => visitor.visit_u64(code),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct ListAccess<'a, 'r> {
    de: &'a mut Deserializer<'r>,
    remaining: u32,
}

impl<'de, 'a, 'r> de::SeqAccess<'de> for ListAccess<'a, 'r> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining as usize)
    }
}

/// Yields the descriptor then the fields of a described list
///
/// Fields past the declared count read as absent. Errors raised while reading a field are
/// located at the field.
struct DescribedListAccess<'a, 'r> {
    de: &'a mut Deserializer<'r>,
    descriptor: Option<Descriptor>,
    remaining: u32,
    index: u32,
    track: bool,
}

impl<'de, 'a, 'r> de::SeqAccess<'de> for DescribedListAccess<'a, 'r> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        if let Some(descriptor) = self.descriptor.take() {
            return seed.deserialize(DescriptorDeserializer(descriptor)).map(Some);
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let index = self.index;
        self.index += 1;

        let offset = self.de.reader.position();
        let present = !self.de.reader.next_is_null();
        self.de.field = true;
        let value = seed.deserialize(&mut *self.de);
        self.de.field = false;
        let value = value.map_err(|err| err.located(offset))?;
        if self.track && present {
            self.de.presence.set(index);
        }
        Ok(Some(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining as usize + self.descriptor.is_some() as usize)
    }
}

struct DescribedBasicAccess<'a, 'r> {
    de: &'a mut Deserializer<'r>,
    descriptor: Option<Descriptor>,
    value_read: bool,
}

impl<'de, 'a, 'r> de::SeqAccess<'de> for DescribedBasicAccess<'a, 'r> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        if let Some(descriptor) = self.descriptor.take() {
            return seed.deserialize(DescriptorDeserializer(descriptor)).map(Some);
        }
        if self.value_read {
            return Ok(None);
        }
        self.value_read = true;
        seed.deserialize(&mut *self.de).map(Some)
    }
}

struct MapAccess<'a, 'r> {
    de: &'a mut Deserializer<'r>,
    remaining: u32,
}

impl<'de, 'a, 'r> de::MapAccess<'de> for MapAccess<'a, 'r> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining as usize)
    }
}

struct DescribedEnumAccess<'a, 'r> {
    de: &'a mut Deserializer<'r>,
    descriptor: Descriptor,
}

impl<'de, 'a, 'r> de::EnumAccess<'de> for DescribedEnumAccess<'a, 'r> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let variant = seed.deserialize(DescriptorDeserializer(self.descriptor.clone()))?;
        Ok((variant, self))
    }
}

impl<'de, 'a, 'r> de::VariantAccess<'de> for DescribedEnumAccess<'a, 'r> {
    type Error = Error;

    fn unit_variant(self) -> Result<(), Self::Error> {
        Err(de::Error::custom("described value read as a unit variant"))
    }

    /// The whole described value, descriptor included, is the content of the variant
    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        seed.deserialize(&mut *self.de)
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom("described value read as a tuple variant"))
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom("described value read as a struct variant"))
    }
}
