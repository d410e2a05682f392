//! AMQP 1.0 transport performatives, Part 2.7

use oxamqp_codec::{Descriptor, Deserializer, Error as CodecError, Reader};
use serde::{Deserialize, Serialize};

use crate::registry::{KnownDescriptor, Registry};

mod attach;
mod begin;
mod close;
mod detach;
mod disposition;
mod end;
mod flow;
mod open;
mod transfer;

pub use attach::Attach;
pub use begin::Begin;
pub use close::Close;
pub use detach::Detach;
pub use disposition::Disposition;
pub use end::End;
pub use flow::Flow;
pub use open::Open;
pub use transfer::Transfer;

/// The body of an AMQP frame
#[derive(Debug, Clone, PartialEq)]
pub enum Performative {
    /// Open
    Open(Open),
    /// Begin
    Begin(Begin),
    /// Attach
    Attach(Attach),
    /// Flow
    Flow(Flow),
    /// Transfer
    Transfer(Transfer),
    /// Disposition
    Disposition(Disposition),
    /// Detach
    Detach(Detach),
    /// End
    End(End),
    /// Close
    Close(Close),
}

impl Performative {
    /// Symbolic name of the performative
    pub fn name(&self) -> &'static str {
        match self {
            Performative::Open(_) => "open",
            Performative::Begin(_) => "begin",
            Performative::Attach(_) => "attach",
            Performative::Flow(_) => "flow",
            Performative::Transfer(_) => "transfer",
            Performative::Disposition(_) => "disposition",
            Performative::Detach(_) => "detach",
            Performative::End(_) => "end",
            Performative::Close(_) => "close",
        }
    }

    /// Decodes a performative, resolving its descriptor through `registry`
    pub fn decode_with(reader: &mut Reader, registry: &Registry) -> Result<Self, CodecError> {
        let offset = reader.position();
        let lookahead = reader.peek_descriptor()?;
        let not_a_performative = || CodecError::DescriptorMismatch {
            offset,
            expected: "performative",
        };
        let known = registry
            .resolve(&lookahead)
            .ok_or_else(not_a_performative)?;
        // aliases decode as the descriptor they stand for
        let mut de = Deserializer::resolving(reader, Descriptor::Code(known.code()));
        let performative = match known {
            KnownDescriptor::Open => Performative::Open(Open::deserialize(&mut de)?),
            KnownDescriptor::Begin => Performative::Begin(Begin::deserialize(&mut de)?),
            KnownDescriptor::Attach => Performative::Attach(Attach::deserialize(&mut de)?),
            KnownDescriptor::Flow => Performative::Flow(Flow::deserialize(&mut de)?),
            KnownDescriptor::Transfer => Performative::Transfer(Transfer::deserialize(&mut de)?),
            KnownDescriptor::Disposition => {
                Performative::Disposition(Disposition::deserialize(&mut de)?)
            }
            KnownDescriptor::Detach => Performative::Detach(Detach::deserialize(&mut de)?),
            KnownDescriptor::End => Performative::End(End::deserialize(&mut de)?),
            KnownDescriptor::Close => Performative::Close(Close::deserialize(&mut de)?),
            _ => return Err(not_a_performative()),
        };
        Ok(performative)
    }

    /// Decodes a performative with the standard descriptors only
    pub fn decode(reader: &mut Reader) -> Result<Self, CodecError> {
        Self::decode_with(reader, &Registry::amqp())
    }
}

impl Serialize for Performative {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Performative::Open(p) => p.serialize(serializer),
            Performative::Begin(p) => p.serialize(serializer),
            Performative::Attach(p) => p.serialize(serializer),
            Performative::Flow(p) => p.serialize(serializer),
            Performative::Transfer(p) => p.serialize(serializer),
            Performative::Disposition(p) => p.serialize(serializer),
            Performative::Detach(p) => p.serialize(serializer),
            Performative::End(p) => p.serialize(serializer),
            Performative::Close(p) => p.serialize(serializer),
        }
    }
}

macro_rules! impl_from_performative {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for Performative {
                fn from(value: $variant) -> Self {
                    Performative::$variant(value)
                }
            }
        )+
    };
}

impl_from_performative!(Open, Begin, Attach, Flow, Transfer, Disposition, Detach, End, Close);

#[cfg(test)]
mod tests {
    use oxamqp_codec::{to_bytes, Reader};

    use super::*;
    use crate::definitions::Handle;

    #[test]
    fn dispatches_on_numeric_descriptor() {
        let buf = to_bytes(&End::default()).unwrap();
        let mut reader = Reader::new(buf);
        let performative = Performative::decode_with(&mut reader, &Registry::amqp()).unwrap();
        assert_eq!(performative, Performative::End(End::default()));
        assert!(reader.is_empty());
    }

    #[test]
    fn dispatches_on_symbolic_descriptor() {
        // 0x00 sym8 "amqp:detach:list" list8 [handle 1]
        let mut buf = vec![0x00, 0xa3, 16];
        buf.extend_from_slice(b"amqp:detach:list");
        buf.extend_from_slice(&[0xc0, 0x03, 0x01, 0x52, 0x01]);
        let mut reader = Reader::new(buf);
        let performative = Performative::decode_with(&mut reader, &Registry::amqp()).unwrap();
        assert_eq!(
            performative,
            Performative::Detach(Detach {
                handle: Handle(1),
                closed: false,
                error: None
            })
        );
    }

    #[test]
    fn rejects_non_performative_descriptor() {
        // amqp:accepted:list
        let mut reader = Reader::new(vec![0x00, 0x53, 0x24, 0x45]);
        let err = Performative::decode_with(&mut reader, &Registry::amqp()).unwrap_err();
        assert!(matches!(err, CodecError::DescriptorMismatch { offset: 0, .. }));
    }

    #[test]
    fn aliased_descriptor_dispatches() {
        let registry = Registry::amqp().alias("vendor:close", KnownDescriptor::Close);
        let mut buf = vec![0x00, 0xa3, 12];
        buf.extend_from_slice(b"vendor:close");
        buf.push(0x45);
        let mut reader = Reader::new(buf);
        let performative = Performative::decode_with(&mut reader, &registry).unwrap();
        assert_eq!(performative.name(), "close");
    }
}
