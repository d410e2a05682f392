use oxamqp_codec::primitives::Symbol;
use serde::{de, Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// 3.5.5 Terminus Durability
///
/// Durability policy for a terminus, encoded as a `uint`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u32)]
pub enum TerminusDurability {
    /// No terminus state is retained durably
    #[default]
    None = 0,
    /// Only the existence and configuration of the terminus is retained durably
    Configuration = 1,
    /// In addition to the existence and configuration of the terminus, the unsettled state for
    /// durable messages is retained durably
    UnsettledState = 2,
}

macro_rules! symbol_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($(#[$vmeta:meta])* $variant:ident => $symbol:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Symbolic value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $symbol,)+
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                Symbol::from(self.as_str()).serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let symbol = Symbol::deserialize(deserializer)?;
                match symbol.as_str() {
                    $($symbol => Ok(Self::$variant),)+
                    other => Err(de::Error::invalid_value(de::Unexpected::Str(other), &$label)),
                }
            }
        }
    };
}

symbol_enum! {
    /// 3.5.6 Terminus Expiry Policy
    TerminusExpiryPolicy, "terminus-expiry-policy" {
        /// The expiry timer starts when terminus is detached
        LinkDetach => "link-detach",
        /// The expiry timer starts when the most recently associated session is ended
        SessionEnd => "session-end",
        /// The expiry timer starts when most recently associated connection is closed
        ConnectionClose => "connection-close",
        /// The terminus never expires
        Never => "never",
    }
}

impl Default for TerminusExpiryPolicy {
    fn default() -> Self {
        TerminusExpiryPolicy::SessionEnd
    }
}

symbol_enum! {
    /// 3.5.7 Standard Distribution Mode
    DistributionMode, "distribution-mode" {
        /// Once successfully transferred over the link, the message will no longer be available
        /// to other links from the same node
        Move => "move",
        /// Once successfully transferred over the link, the message is still available for other
        /// links from the same node
        Copy => "copy",
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes, Error as CodecError};

    use super::*;

    #[test]
    fn durability_is_a_uint() {
        assert_eq!(&to_bytes(&TerminusDurability::UnsettledState).unwrap()[..], &[0x52, 0x02]);
        assert_eq!(
            from_slice::<TerminusDurability>(&[0x43]).unwrap(),
            TerminusDurability::None
        );
    }

    #[test]
    fn expiry_policy_is_a_symbol() {
        let buf = to_bytes(&TerminusExpiryPolicy::Never).unwrap();
        assert_eq!(&buf[..], &[0xa3, 0x05, b'n', b'e', b'v', b'e', b'r']);
        let err = from_slice::<DistributionMode>(&[0xa3, 0x01, b'x']).unwrap_err();
        assert!(matches!(err, CodecError::Invalid { offset: 0, .. }), "{err:?}");
    }
}
