use oxamqp_codec::{
    macros::{DeserializeComposite, SerializeComposite},
    primitives::{Array, OrderedMap, Symbol},
    Value,
};

use super::{DistributionMode, Outcome, TerminusDurability, TerminusExpiryPolicy};
use crate::definitions::{Fields, Seconds};

/// 3.5.8 Filter Set
pub type FilterSet = OrderedMap<Symbol, Value>;

/// 3.5.3 Source
///
/// <type name="source" class="composite" source="list" provides="source">
///     <descriptor name="amqp:source:list" code="0x00000000:0x00000028"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:source:list",
    code = "0x0000_0000:0x0000_0028",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Source {
    /// <field name="address" type="*" requires="address"/>
    pub address: Option<String>,

    /// <field name="durable" type="terminus-durability" default="none"/>
    #[amqp_contract(default)]
    pub durable: TerminusDurability,

    /// <field name="expiry-policy" type="terminus-expiry-policy" default="session-end"/>
    #[amqp_contract(default)]
    pub expiry_policy: TerminusExpiryPolicy,

    /// <field name="timeout" type="seconds" default="0"/>
    #[amqp_contract(default)]
    pub timeout: Seconds,

    /// <field name="dynamic" type="boolean" default="false"/>
    #[amqp_contract(default)]
    pub dynamic: bool,

    /// <field name="dynamic-node-properties" type="node-properties"/>
    pub dynamic_node_properties: Option<Fields>,

    /// <field name="distribution-mode" type="symbol" requires="distribution-mode"/>
    pub distribution_mode: Option<DistributionMode>,

    /// <field name="filter" type="filter-set"/>
    pub filter: Option<FilterSet>,

    /// <field name="default-outcome" type="*" requires="outcome"/>
    pub default_outcome: Option<Outcome>,

    /// <field name="outcomes" type="symbol" multiple="true"/>
    pub outcomes: Option<Array<Symbol>>,

    /// <field name="capabilities" type="symbol" multiple="true"/>
    pub capabilities: Option<Array<Symbol>>,
}

impl Source {
    /// A source with only an address
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

impl From<&str> for Source {
    fn from(address: &str) -> Self {
        Self::with_address(address)
    }
}

impl From<String> for Source {
    fn from(address: String) -> Self {
        Self::with_address(address)
    }
}


#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes};

    use super::*;

    #[test]
    fn address_only_source() {
        let source = Source::with_address("q1");
        let buf = to_bytes(&source).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x53, 0x28, 0xc0, 0x05, 0x01, 0xa1, 0x02, b'q', b'1']);
        assert_eq!(from_slice::<Source>(&buf).unwrap(), source);
    }

    #[test]
    fn single_capability_decodes_as_array() {
        // capabilities at index 10 given as a single symbol
        let mut buf = vec![0x00, 0x53, 0x28, 0xc0, 0x0f, 0x0b];
        buf.extend_from_slice(&[0x40; 10]);
        buf.extend_from_slice(&[0xa3, 0x02, b'c', b'1']);
        let source: Source = from_slice(&buf).unwrap();
        assert_eq!(source.capabilities, Some(Array(vec![Symbol::from("c1")])));
        assert_eq!(source.expiry_policy, TerminusExpiryPolicy::SessionEnd);
    }
}
