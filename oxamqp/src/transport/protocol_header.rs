//! Implements the protocol headers

use std::convert::TryFrom;

use oxamqp_types::definitions::{MAJOR, MINOR, REVISION};

const PROTOCOL_HEADER_PREFIX: &[u8; 4] = b"AMQP";

/// Protocol header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Protocol ID
    pub id: ProtocolId,

    /// Major number
    pub major: u8,

    /// Minor number
    pub minor: u8,

    /// Revision number
    pub revision: u8,
}

impl Default for ProtocolHeader {
    fn default() -> Self {
        Self {
            id: ProtocolId::Amqp,
            major: MAJOR,
            minor: MINOR,
            revision: REVISION,
        }
    }
}

impl ProtocolHeader {
    /// Creates a new protocol header
    pub fn new(id: ProtocolId, major: u8, minor: u8, revision: u8) -> Self {
        Self {
            id,
            major,
            minor,
            revision,
        }
    }

    /// Creates an AMQP protocol header
    pub fn amqp() -> Self {
        Self::default()
    }

    /// Creates a SASL protocol header
    pub fn sasl() -> Self {
        Self {
            id: ProtocolId::Sasl,
            ..Default::default()
        }
    }

    /// Returns whether the protocol id is AMQP
    pub fn is_amqp(&self) -> bool {
        matches!(self.id, ProtocolId::Amqp)
    }

    /// Returns whether the protocol id is SASL
    pub fn is_sasl(&self) -> bool {
        matches!(self.id, ProtocolId::Sasl)
    }
}

impl From<ProtocolHeader> for [u8; 8] {
    fn from(value: ProtocolHeader) -> Self {
        [
            PROTOCOL_HEADER_PREFIX[0], // b'A'
            PROTOCOL_HEADER_PREFIX[1], // b'M'
            PROTOCOL_HEADER_PREFIX[2], // b'Q'
            PROTOCOL_HEADER_PREFIX[3], // b'P'
            value.id as u8,
            value.major,
            value.minor,
            value.revision,
        ]
    }
}

impl TryFrom<[u8; 8]> for ProtocolHeader {
    type Error = [u8; 8];

    fn try_from(v: [u8; 8]) -> Result<Self, Self::Error> {
        if &v[..4] != PROTOCOL_HEADER_PREFIX {
            return Err(v);
        }
        let id = ProtocolId::try_from(v[4]).map_err(|_| v)?;
        Ok(Self::new(id, v[5], v[6], v[7]))
    }
}

/// Protocol ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolId {
    /// AMQP
    Amqp = 0x0,

    /// SASL
    Sasl = 0x3,
}

impl TryFrom<u8> for ProtocolId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let val = match value {
            0x0 => Self::Amqp,
            0x3 => Self::Sasl,
            _ => return Err(value),
        };
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::{ProtocolHeader, ProtocolId};

    #[test]
    fn amqp_header_bytes() {
        let buf: [u8; 8] = ProtocolHeader::amqp().into();
        assert_eq!(&buf, b"AMQP\x00\x01\x00\x00");
        let buf: [u8; 8] = ProtocolHeader::sasl().into();
        assert_eq!(&buf, b"AMQP\x03\x01\x00\x00");
    }

    #[test]
    fn parse_header() {
        let header = ProtocolHeader::try_from(*b"AMQP\x03\x01\x00\x00").unwrap();
        assert_eq!(header.id, ProtocolId::Sasl);
        assert!(header.is_sasl());
        assert_eq!(header.major, 1);
    }

    #[test]
    fn wrong_prefix_returns_the_bytes() {
        let bytes = *b"AMQQ\x00\x01\x00\x00";
        assert_eq!(ProtocolHeader::try_from(bytes), Err(bytes));
    }

    #[test]
    fn unknown_protocol_id_returns_the_bytes() {
        let bytes = *b"AMQP\x02\x01\x00\x00";
        assert_eq!(ProtocolHeader::try_from(bytes), Err(bytes));
    }
}
