//! Types defined in AMQP 1.0 specification Part 2.8: Definitions

use bytes::Bytes;
use oxamqp_codec::{
    primitives::{OrderedMap, Symbol},
    Value,
};
use serde::{de, Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

mod error;
pub use error::Error;

mod error_cond;
pub use error_cond::{AmqpError, ConnectionError, ErrorCondition, LinkError, SessionError};

pub mod serial;

/// 2.8.1 Role
///
/// Link endpoint role, encoded as a boolean: `false` for sender and `true` for receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sender
    Sender,
    /// Receiver
    Receiver,
}

impl Role {
    /// The role of the peer's end of the link
    pub fn opposite(&self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(matches!(self, Role::Receiver))
    }
}

struct RoleVisitor;

impl<'de> de::Visitor<'de> for RoleVisitor {
    type Value = Role;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("role")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        match v {
            false => Ok(Role::Sender),
            true => Ok(Role::Receiver),
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bool(RoleVisitor)
    }
}

/// 2.8.2 Sender Settle Mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SenderSettleMode {
    /// The sender will send all deliveries initially unsettled to the receiver
    Unsettled = 0,
    /// The sender will send all deliveries settled to the receiver
    Settled = 1,
    /// The sender MAY send a mixture of settled and unsettled deliveries to the receiver
    #[default]
    Mixed = 2,
}

/// 2.8.3 Receiver Settle Mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ReceiverSettleMode {
    /// The receiver will spontaneously settle all incoming transfers
    #[default]
    First = 0,
    /// The receiver will only settle after sending the disposition to the sender and
    /// receiving a disposition indicating settlement of the delivery from the sender
    Second = 1,
}

/// 2.8.4 Handle
///
/// The handle MUST NOT be used by the sender past the `handle-max` of the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Default for Handle {
    fn default() -> Self {
        Handle(u32::MAX)
    }
}

impl From<u32> for Handle {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl From<Handle> for u32 {
    fn from(val: Handle) -> Self {
        val.0
    }
}

/// 2.8.5 Seconds
pub type Seconds = u32;

/// 2.8.6 Milliseconds
pub type Milliseconds = u32;

/// 2.8.7 Delivery Tag
///
/// A delivery-tag can be up to 32 octets of binary data
pub type DeliveryTag = Bytes;

/// 2.8.8 Delivery Number
pub type DeliveryNumber = SequenceNo;

/// 2.8.9 Transfer Number
pub type TransferNumber = SequenceNo;

/// 2.8.10 Sequence No
///
/// 32-bit RFC-1982 serial number, see [`serial`] for the comparison rules
pub type SequenceNo = u32;

/// 2.8.11 Message Format
pub type MessageFormat = u32;

/// 2.8.12 IETF Language Tag
pub type IetfLanguageTag = Symbol;

/// 2.8.13 Fields
pub type Fields = OrderedMap<Symbol, Value>;

/// Maximum length of a delivery tag
pub const MAX_DELIVERY_TAG_LEN: usize = 32;

/// 2.8.19 Constant definition
///
/// Major protocol version
pub const MAJOR: u8 = 1;

/// Minor protocol version
pub const MINOR: u8 = 0;

/// Protocol revision
pub const REVISION: u8 = 0;

/// IANA assigned port number for AMQP
pub const PORT: u16 = 5672;

/// IANA assigned port number for secure AMQP (amqps)
pub const SECURE_PORT: u16 = 5671;

/// The lower bound for the agreed maximum frame size (in bytes)
pub const MIN_MAX_FRAME_SIZE: u32 = 512;

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes, Error as CodecError};

    use super::*;

    #[test]
    fn role_is_a_boolean() {
        assert_eq!(&to_bytes(&Role::Sender).unwrap()[..], &[0x42]);
        assert_eq!(&to_bytes(&Role::Receiver).unwrap()[..], &[0x41]);
        assert_eq!(from_slice::<Role>(&[0x56, 0x01]).unwrap(), Role::Receiver);
    }

    #[test]
    fn settle_mode_is_a_ubyte() {
        assert_eq!(&to_bytes(&ReceiverSettleMode::Second).unwrap()[..], &[0x50, 0x01]);
        assert_eq!(
            from_slice::<SenderSettleMode>(&[0x50, 0x00]).unwrap(),
            SenderSettleMode::Unsettled
        );
    }

    #[test]
    fn unknown_settle_mode_is_rejected() {
        let err = from_slice::<SenderSettleMode>(&[0x50, 0x03]).unwrap_err();
        assert!(matches!(err, CodecError::Invalid { offset: 0, .. }), "{err:?}");
    }

    #[test]
    fn handle_is_a_bare_uint() {
        assert_eq!(&to_bytes(&Handle(7)).unwrap()[..], &[0x52, 0x07]);
        assert_eq!(from_slice::<Handle>(&[0x43]).unwrap(), Handle(0));
    }
}
