use oxamqp_codec::{
    __constants::DESCRIBED_ENUM,
    macros::{DeserializeComposite, SerializeComposite},
    Descriptor,
};
use serde::{
    de::{self, VariantAccess},
    Deserialize, Serialize,
};

use crate::{
    definitions::{Error, Fields},
    registry::KnownDescriptor,
};

/// 3.4.1 Received
///
/// At the target the received state indicates the furthest point in the payload of the
/// message which the target will not need to have resent if the link is resumed.
#[derive(Debug, Clone, PartialEq, Eq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:received:list",
    code = "0x0000_0000:0x0000_0023",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Received {
    /// <field name="section-number" type="uint" mandatory="true"/>
    pub section_number: u32,

    /// <field name="section-offset" type="ulong" mandatory="true"/>
    pub section_offset: u64,
}

/// 3.4.2 Accepted
///
/// The accepted outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:accepted:list",
    code = "0x0000_0000:0x0000_0024",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Accepted {}

/// 3.4.3 Rejected
///
/// The rejected outcome
#[derive(Debug, Clone, Default, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:rejected:list",
    code = "0x0000_0000:0x0000_0025",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Rejected {
    /// <field name="error" type="error"/>
    pub error: Option<Error>,
}

/// 3.4.4 Released
///
/// The released outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:released:list",
    code = "0x0000_0000:0x0000_0026",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Released {}

/// 3.4.5 Modified
///
/// The modified outcome
#[derive(Debug, Clone, Default, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:modified:list",
    code = "0x0000_0000:0x0000_0027",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Modified {
    /// <field name="delivery-failed" type="boolean"/>
    pub delivery_failed: Option<bool>,

    /// <field name="undeliverable-here" type="boolean"/>
    pub undeliverable_here: Option<bool>,

    /// <field name="message-annotations" type="fields"/>
    pub message_annotations: Option<Fields>,
}

/// Delivery state of a transfer or a disposition
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
    /// 3.4.1 Received, not terminal
    Received(Received),
    /// 3.4.2 Accepted
    Accepted(Accepted),
    /// 3.4.3 Rejected
    Rejected(Rejected),
    /// 3.4.4 Released
    Released(Released),
    /// 3.4.5 Modified
    Modified(Modified),
}

impl DeliveryState {
    /// Whether the state is one of the terminal outcomes
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Received(_))
    }

    /// Whether the state is [`Accepted`]
    pub fn is_accepted(&self) -> bool {
        matches!(self, DeliveryState::Accepted(_))
    }
}

/// The terminal delivery states
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 3.4.2 Accepted
    Accepted(Accepted),
    /// 3.4.3 Rejected
    Rejected(Rejected),
    /// 3.4.4 Released
    Released(Released),
    /// 3.4.5 Modified
    Modified(Modified),
}

impl Outcome {
    /// Whether the outcome is [`Accepted`]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }
}

impl From<Outcome> for DeliveryState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Accepted(v) => DeliveryState::Accepted(v),
            Outcome::Rejected(v) => DeliveryState::Rejected(v),
            Outcome::Released(v) => DeliveryState::Released(v),
            Outcome::Modified(v) => DeliveryState::Modified(v),
        }
    }
}

impl TryFrom<DeliveryState> for Outcome {
    type Error = DeliveryState;

    fn try_from(state: DeliveryState) -> Result<Self, Self::Error> {
        match state {
            DeliveryState::Accepted(v) => Ok(Outcome::Accepted(v)),
            DeliveryState::Rejected(v) => Ok(Outcome::Rejected(v)),
            DeliveryState::Released(v) => Ok(Outcome::Released(v)),
            DeliveryState::Modified(v) => Ok(Outcome::Modified(v)),
            other => Err(other),
        }
    }
}

impl Serialize for DeliveryState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeliveryState::Received(v) => v.serialize(serializer),
            DeliveryState::Accepted(v) => v.serialize(serializer),
            DeliveryState::Rejected(v) => v.serialize(serializer),
            DeliveryState::Released(v) => v.serialize(serializer),
            DeliveryState::Modified(v) => v.serialize(serializer),
        }
    }
}

struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = DeliveryState;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("delivery-state")
    }

    fn visit_enum<A: de::EnumAccess<'de>>(self, data: A) -> Result<Self::Value, A::Error> {
        let (descriptor, variant) = data.variant::<Descriptor>()?;
        match KnownDescriptor::from_descriptor(&descriptor) {
            Some(KnownDescriptor::Received) => variant.newtype_variant().map(DeliveryState::Received),
            Some(KnownDescriptor::Accepted) => variant.newtype_variant().map(DeliveryState::Accepted),
            Some(KnownDescriptor::Rejected) => variant.newtype_variant().map(DeliveryState::Rejected),
            Some(KnownDescriptor::Released) => variant.newtype_variant().map(DeliveryState::Released),
            Some(KnownDescriptor::Modified) => variant.newtype_variant().map(DeliveryState::Modified),
            _ => Err(de::Error::invalid_value(
                de::Unexpected::Other("descriptor"),
                &self,
            )),
        }
    }
}

impl<'de> Deserialize<'de> for DeliveryState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        const VARIANTS: &[&str] = &[
            "amqp:received:list",
            "amqp:accepted:list",
            "amqp:rejected:list",
            "amqp:released:list",
            "amqp:modified:list",
        ];
        deserializer.deserialize_enum(DESCRIBED_ENUM, VARIANTS, Visitor)
    }
}

impl Serialize for Outcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Accepted(v) => v.serialize(serializer),
            Outcome::Rejected(v) => v.serialize(serializer),
            Outcome::Released(v) => v.serialize(serializer),
            Outcome::Modified(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = DeliveryState::deserialize(deserializer)?;
        Outcome::try_from(state)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Other("received"), &"outcome"))
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_reader_with_presence, from_slice, to_bytes, Error as CodecError, Reader};

    use super::*;
    use crate::definitions::AmqpError;

    #[test]
    fn accepted_is_an_empty_list() {
        let buf = to_bytes(&DeliveryState::Accepted(Accepted {})).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x53, 0x24, 0x45]);
    }

    #[test]
    fn modified_with_first_and_third_field() {
        let mut annotations = Fields::new();
        annotations.insert("x-opt-reason".into(), "retry".into());
        let modified = Modified {
            delivery_failed: Some(true),
            undeliverable_here: None,
            message_annotations: Some(annotations),
        };
        let buf = to_bytes(&modified).unwrap();

        let mut reader = Reader::new(buf);
        let (decoded, presence) = from_reader_with_presence::<Modified>(&mut reader).unwrap();
        assert_eq!(decoded, modified);
        assert!(presence.has_field(0));
        assert!(!presence.has_field(1));
        assert!(presence.has_field(2));
        assert_eq!(decoded.undeliverable_here, None);
    }

    #[test]
    fn rejected_carries_error() {
        let state = DeliveryState::Rejected(Rejected {
            error: Some(AmqpError::NotAllowed.into()),
        });
        let decoded: DeliveryState = from_slice(&to_bytes(&state).unwrap()).unwrap();
        assert_eq!(decoded, state);
        assert!(decoded.is_terminal());
    }

    #[test]
    fn received_is_not_an_outcome() {
        let state = DeliveryState::Received(Received {
            section_number: 0,
            section_offset: 10,
        });
        let err = from_slice::<Outcome>(&to_bytes(&state).unwrap()).unwrap_err();
        match err {
            CodecError::Invalid { offset, message } => {
                assert_eq!(offset, 0);
                assert!(message.contains("outcome"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_state_is_rejected() {
        // amqp:source:list is not a delivery state
        let err = from_slice::<DeliveryState>(&[0x00, 0x53, 0x28, 0x45]).unwrap_err();
        assert!(matches!(err, CodecError::Invalid { offset: 0, .. }), "{err:?}");
    }
}
