use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use serde::{de, Deserialize, Serialize};

use crate::{
    __constants::TIMESTAMP,
    decode::{Decode, Reader},
    encode::Encode,
    format_code::EncodingCodes,
    Error,
};

/// An absolute point in time, milliseconds since the unix epoch
///
/// encoding code = 0x83, category = fixed, width = 8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the unix epoch
    pub fn from_milliseconds(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the unix epoch
    pub fn milliseconds(&self) -> i64 {
        self.0
    }

    /// Current system time truncated to milliseconds
    pub fn now() -> Self {
        let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => -(e.duration().as_millis() as i64),
        };
        Self(millis)
    }
}

impl From<i64> for Timestamp {
    fn from(val: i64) -> Self {
        Self(val)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(val: Timestamp) -> Self {
        if val.0 >= 0 {
            UNIX_EPOCH + Duration::from_millis(val.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(val.0.unsigned_abs())
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(TIMESTAMP, &self.0)
    }
}

struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Timestamp;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("timestamp")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Timestamp(v))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(TIMESTAMP, Visitor)
    }
}

impl Encode for Timestamp {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::Timestamp as u8);
        buf.put_i64(self.0);
    }
}

impl Decode for Timestamp {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_code()? {
            (_, EncodingCodes::Timestamp) => Ok(Self(i64::from_be_bytes(reader.read_array()?))),
            (offset, found) => Err(Error::TypeMismatch {
                offset,
                expected: "timestamp",
                found,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_slice, to_bytes};

    #[test]
    fn timestamp_uses_its_own_constructor() {
        let ts = Timestamp::from_milliseconds(1_311_704_463_521);
        let buf = to_bytes(&ts).unwrap();
        assert_eq!(buf[0], 0x83);
        assert_eq!(from_slice::<Timestamp>(&buf).unwrap(), ts);
        assert!(from_slice::<i64>(&buf).is_err());
    }

    #[test]
    fn negative_timestamp_converts_to_system_time() {
        let ts = Timestamp::from_milliseconds(-1_000);
        let time: SystemTime = ts.into();
        assert_eq!(UNIX_EPOCH.duration_since(time).unwrap(), Duration::from_secs(1));
    }
}
