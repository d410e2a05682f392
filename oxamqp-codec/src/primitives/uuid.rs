use bytes::{BufMut, BytesMut};
use serde::{de, Deserialize, Serialize};

use crate::{
    __constants::UUID,
    decode::{Decode, Reader},
    encode::Encode,
    format_code::EncodingCodes,
    Error,
};

/// A universally unique identifier as defined by RFC-4122 section 4.1.2
///
/// encoding code = 0x98, category = fixed, width = 16
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid([u8; 16]);

impl Uuid {
    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(val: [u8; 16]) -> Self {
        Self(val)
    }
}

impl From<Uuid> for [u8; 16] {
    fn from(val: Uuid) -> Self {
        val.0
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for Uuid {
    fn from(val: uuid::Uuid) -> Self {
        Self(val.into_bytes())
    }
}

#[cfg(feature = "uuid")]
impl From<Uuid> for uuid::Uuid {
    fn from(val: Uuid) -> Self {
        uuid::Uuid::from_bytes(val.0)
    }
}

impl Serialize for Uuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(UUID, serde_bytes::Bytes::new(&self.0))
    }
}

struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Uuid;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("uuid")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        v.try_into()
            .map(Uuid)
            .map_err(|_| E::invalid_length(v.len(), &self))
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(UUID, Visitor)
    }
}

impl Encode for Uuid {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Uuid as u8);
        buf.put_slice(&self.0);
    }
}

impl Decode for Uuid {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Uuid) => Ok(Self(reader.read_array()?)),
            (offset, found) => Err(Error::TypeMismatch {
                offset,
                expected: "uuid",
                found,
            }),
        }
    }
}

#[cfg(all(test, feature = "uuid"))]
mod tests {
    use super::*;
    use crate::{from_slice, to_bytes};

    #[test]
    fn converts_from_uuid_crate() {
        let original = uuid::Uuid::new_v4();
        let amqp = Uuid::from(original);
        let buf = to_bytes(&amqp).unwrap();
        assert_eq!(buf.len(), 17);
        let decoded: Uuid = from_slice(&buf).unwrap();
        assert_eq!(uuid::Uuid::from(decoded), original);
    }
}
