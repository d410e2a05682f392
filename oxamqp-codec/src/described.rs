//! Described types

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::{de, ser::SerializeTupleStruct, Deserialize, Serialize};

use crate::{
    __constants::DESCRIBED_BASIC, descriptor::Descriptor, encode::Encode,
    format_code::EncodingCodes,
};

/// A value annotated with a descriptor
///
/// This is the generic fallback for described types that are not known to the decoder, so the
/// descriptor and the inner value are kept rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Described<T> {
    /// Descriptor of the value
    pub descriptor: Descriptor,

    /// The inner value
    pub value: T,
}

impl<T> Described<T> {
    /// Creates a new described value
    pub fn new(descriptor: impl Into<Descriptor>, value: T) -> Self {
        Self {
            descriptor: descriptor.into(),
            value,
        }
    }
}

impl<T: Encode> Encode for Described<T> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(EncodingCodes::DescribedType as u8);
        self.descriptor.encode(buf);
        self.value.encode(buf);
    }
}

impl<T: Serialize> Serialize for Described<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_tuple_struct(DESCRIBED_BASIC, 2)?;
        state.serialize_field(&self.descriptor)?;
        state.serialize_field(&self.value)?;
        state.end()
    }
}

struct Visitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> de::Visitor<'de> for Visitor<T> {
    type Value = Described<T>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("described value")
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let descriptor = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let value = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(Described { descriptor, value })
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Described<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple_struct(DESCRIBED_BASIC, 2, Visitor(PhantomData))
    }
}

#[cfg(all(test, feature = "derive"))]
mod tests {
    use super::*;
    use crate::{
        from_reader_with_presence, from_slice,
        macros::{DeserializeComposite, SerializeComposite},
        primitives::{Array, Symbol},
        to_bytes, Error, Reader, Value,
    };

    #[derive(Debug, PartialEq, SerializeComposite, DeserializeComposite)]
    #[amqp_contract(
        name = "test:sample:list",
        code = "0x0000_beef:0x0000_0001",
        encoding = "list",
        rename_all = "kebab-case"
    )]
    struct Sample {
        first: bool,
        second: Option<u32>,
        third: Option<Symbol>,
        #[amqp_contract(default)]
        fourth: bool,
    }

    #[derive(Debug, PartialEq, SerializeComposite, DeserializeComposite)]
    #[amqp_contract(name = "test:locales:list", encoding = "list", rename_all = "kebab-case")]
    struct Locales {
        locales: Option<Array<Symbol>>,
    }

    #[test]
    fn trailing_nulls_are_left_out() {
        let sample = Sample {
            first: true,
            second: Some(1),
            third: None,
            fourth: false,
        };
        let buf = to_bytes(&sample).unwrap();
        assert_eq!(&buf[..10], &[0x00, 0x80, 0x00, 0x00, 0xbe, 0xef, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&buf[10..], &[0xc0, 0x04, 0x02, 0x41, 0x52, 0x01]);
    }

    #[test]
    fn omitted_fields_decode_to_defaults() {
        let sample = Sample {
            first: true,
            second: None,
            third: Some(Symbol::from("x")),
            fourth: false,
        };
        let buf = to_bytes(&sample).unwrap();
        let mut reader = Reader::new(buf);
        let (decoded, presence) = from_reader_with_presence::<Sample>(&mut reader).unwrap();
        assert_eq!(decoded, sample);
        assert!(presence.has_field(0));
        assert!(!presence.has_field(1));
        assert!(presence.has_field(2));
        assert!(!presence.has_field(3));
    }

    #[test]
    fn symbolic_descriptor_is_accepted() {
        let mut buf = vec![0x00];
        buf.extend_from_slice(&to_bytes(&Symbol::from("test:sample:list")).unwrap());
        buf.extend_from_slice(&[0xc0, 0x02, 0x01, 0x42]);
        let decoded: Sample = from_slice(&buf).unwrap();
        assert!(!decoded.first);
        assert_eq!(decoded.second, None);
    }

    #[test]
    fn wrong_descriptor_is_rejected() {
        let buf = to_bytes(&Described::new(0x99u64, Value::List(vec![Value::Bool(true)]))).unwrap();
        let err = from_slice::<Sample>(&buf).unwrap_err();
        assert!(matches!(err, Error::Invalid { offset: 0, .. }), "{err:?}");
    }

    #[test]
    fn missing_mandatory_field() {
        let mut buf = vec![0x00, 0xa3, 0x10];
        buf.extend_from_slice(b"test:sample:list");
        buf.push(0x45);
        let err = from_slice::<Sample>(&buf).unwrap_err();
        assert_eq!(err, Error::MissingField { field: "first" });
    }

    #[test]
    fn field_error_is_located_at_the_field() {
        // `second` holds a string
        let mut buf = to_bytes(&Descriptor::Code(0x0000_beef_0000_0001)).unwrap().to_vec();
        buf.insert(0, 0x00);
        let field_offset = buf.len() + 4;
        buf.extend_from_slice(&[0xc0, 0x05, 0x02, 0x41, 0xa1, 0x01, b'x']);
        let err = from_slice::<Sample>(&buf).unwrap_err();
        assert_eq!(err.offset(), Some(field_offset));
    }

    #[test]
    fn unknown_trailing_fields_are_skipped() {
        let mut buf = to_bytes(&Descriptor::Code(0x0000_beef_0000_0001)).unwrap().to_vec();
        buf.insert(0, 0x00);
        // three more fields than declared, then a ubyte after the list
        buf.extend_from_slice(&[0xc0, 0x09, 0x06, 0x41, 0x40, 0x40, 0x40, 0xa1, 0x01, b'x', 0x43]);
        buf.extend_from_slice(&[0x50, 0x07]);
        let mut reader = Reader::new(buf);
        let sample: Sample = crate::from_reader(&mut reader).unwrap();
        assert!(sample.first);
        assert_eq!(from_slice::<u8>(&reader.split_remaining()).unwrap(), 7);
    }

    #[test]
    fn multiple_field_accepts_single_value() {
        let mut buf = vec![0x00];
        buf.extend_from_slice(&to_bytes(&Symbol::from("test:locales:list")).unwrap());
        buf.extend_from_slice(&[0xc0, 0x08, 0x01, 0xa3, 0x05, b'e', b'n', b'-', b'U', b'S']);
        let decoded: Locales = from_slice(&buf).unwrap();
        assert_eq!(decoded.locales, Some(Array(vec![Symbol::from("en-US")])));
    }

    #[test]
    fn unknown_described_value_is_preserved() {
        let original = Described::new(Symbol::from("vendor:ext"), Value::from("payload"));
        let decoded: Value = from_slice(&to_bytes(&original).unwrap()).unwrap();
        assert_eq!(decoded, Value::Described(Box::new(original)));
    }
}
