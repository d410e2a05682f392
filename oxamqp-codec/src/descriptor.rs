use std::fmt;

use bytes::BytesMut;
use serde::{de, Deserialize, Serialize};

use crate::{
    __constants::DESCRIPTOR,
    decode::{Decode, Reader},
    encode::Encode,
    format_code::EncodingCodes,
    primitives::Symbol,
    Error,
};

/// Descriptor of a described type, either a symbolic name or a numeric code
///
/// Numeric codes are the 64-bit `domain-id:descriptor-id` pairs of the AMQP 1.0 type
/// definitions, e.g. `0x0000_0000:0x0000_0010` for `amqp:open:list`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Descriptor {
    /// Symbolic descriptor
    Name(Symbol),

    /// Numeric descriptor
    Code(u64),
}

impl Descriptor {
    /// Whether the descriptor identifies the type with the given name and code
    pub fn matches(&self, name: &str, code: u64) -> bool {
        match self {
            Descriptor::Name(symbol) => symbol.as_str() == name,
            Descriptor::Code(value) => *value == code,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Name(name) => write!(f, "{}", name),
            Descriptor::Code(code) => write!(f, "0x{:08x}:0x{:08x}", code >> 32, code & 0xffff_ffff),
        }
    }
}

impl From<u64> for Descriptor {
    fn from(code: u64) -> Self {
        Descriptor::Code(code)
    }
}

impl From<Symbol> for Descriptor {
    fn from(name: Symbol) -> Self {
        Descriptor::Name(name)
    }
}

impl Serialize for Descriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Descriptor::Name(name) => name.serialize(serializer),
            Descriptor::Code(code) => serializer.serialize_u64(*code),
        }
    }
}

struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Descriptor;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("symbol or ulong descriptor")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Descriptor::Name(Symbol::from(v)))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Descriptor::Name(Symbol::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Descriptor::Code(v))
    }
}

impl<'de> Deserialize<'de> for Descriptor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(DESCRIPTOR, Visitor)
    }
}

impl Encode for Descriptor {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Descriptor::Name(name) => name.encode(buf),
            Descriptor::Code(code) => code.encode(buf),
        }
    }
}

impl Decode for Descriptor {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.peek_code()? {
            EncodingCodes::Sym8 | EncodingCodes::Sym32 => Symbol::decode(reader).map(Self::Name),
            EncodingCodes::ULong | EncodingCodes::SmallULong | EncodingCodes::ULong0 => {
                u64::decode(reader).map(Self::Code)
            }
            found => Err(Error::TypeMismatch {
                offset: reader.position(),
                expected: "descriptor",
                found,
            }),
        }
    }
}
