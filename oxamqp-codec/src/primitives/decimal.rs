use bytes::{BufMut, BytesMut};
use serde::{de, Deserialize, Serialize};

use crate::{
    __constants::{DECIMAL128, DECIMAL32, DECIMAL64},
    decode::{Decode, Reader},
    encode::Encode,
    format_code::EncodingCodes,
    Error,
};

macro_rules! decimal_type {
    ($(#[$meta:meta])* $name:ident, $width:literal, $code:ident, $label:literal, $newtype:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $width]);

        impl $name {
            /// Raw big-endian IEEE 754 bytes
            pub fn into_inner(self) -> [u8; $width] {
                self.0
            }
        }

        impl From<[u8; $width]> for $name {
            fn from(val: [u8; $width]) -> Self {
                Self(val)
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_newtype_struct($newtype, serde_bytes::Bytes::new(&self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct Visitor;

                impl<'de> de::Visitor<'de> for Visitor {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                        formatter.write_str($label)
                    }

                    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                        v.try_into()
                            .map($name)
                            .map_err(|_| E::invalid_length(v.len(), &self))
                    }
                }

                deserializer.deserialize_newtype_struct($newtype, Visitor)
            }
        }

        impl Encode for $name {
            fn encode(&self, buf: &mut BytesMut) {
                buf.put_u8(EncodingCodes::$code as u8);
                buf.put_slice(&self.0);
            }
        }

        impl Decode for $name {
            fn decode(reader: &mut Reader) -> Result<Self, Error> {
                match reader.read_code()? {
                    (_, EncodingCodes::$code) => Ok(Self(reader.read_array()?)),
                    (offset, found) => Err(Error::TypeMismatch {
                        offset,
                        expected: $label,
                        found,
                    }),
                }
            }
        }
    };
}

decimal_type!(
    /// 32-bit decimal number (IEEE 754-2008 decimal32), kept as opaque bytes
    Dec32,
    4,
    Decimal32,
    "decimal32",
    DECIMAL32
);

decimal_type!(
    /// 64-bit decimal number (IEEE 754-2008 decimal64), kept as opaque bytes
    Dec64,
    8,
    Decimal64,
    "decimal64",
    DECIMAL64
);

decimal_type!(
    /// 128-bit decimal number (IEEE 754-2008 decimal128), kept as opaque bytes
    Dec128,
    16,
    Decimal128,
    "decimal128",
    DECIMAL128
);
