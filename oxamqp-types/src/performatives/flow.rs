use oxamqp_codec::macros::{DeserializeComposite, SerializeComposite};

use crate::definitions::{Fields, Handle, SequenceNo, TransferNumber};

/// 2.7.4 Flow
///
/// Update link state.
/// <type name="flow" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:flow:list" code="0x00000000:0x00000013"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:flow:list",
    code = "0x0000_0000:0x0000_0013",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Flow {
    /// <field name="next-incoming-id" type="transfer-number"/>
    pub next_incoming_id: Option<TransferNumber>,

    /// <field name="incoming-window" type="uint" mandatory="true"/>
    pub incoming_window: u32,

    /// <field name="next-outgoing-id" type="transfer-number" mandatory="true"/>
    pub next_outgoing_id: TransferNumber,

    /// <field name="outgoing-window" type="uint" mandatory="true"/>
    pub outgoing_window: u32,

    /// <field name="handle" type="handle"/>
    ///
    /// A session-only flow leaves every link field unset
    pub handle: Option<Handle>,

    /// <field name="delivery-count" type="sequence-no"/>
    pub delivery_count: Option<SequenceNo>,

    /// <field name="link-credit" type="uint"/>
    pub link_credit: Option<u32>,

    /// <field name="available" type="uint"/>
    pub available: Option<u32>,

    /// <field name="drain" type="boolean" default="false"/>
    #[amqp_contract(default)]
    pub drain: bool,

    /// <field name="echo" type="boolean" default="false"/>
    #[amqp_contract(default)]
    pub echo: bool,

    /// <field name="properties" type="fields"/>
    pub properties: Option<Fields>,
}

impl Flow {
    /// Whether the flow carries link state
    pub fn is_link_flow(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes};

    use super::*;

    #[test]
    fn session_flow_omits_link_fields() {
        let flow = Flow {
            next_incoming_id: Some(1),
            incoming_window: 10,
            next_outgoing_id: 0,
            outgoing_window: 10,
            ..Default::default()
        };
        let buf = to_bytes(&flow).unwrap();
        assert_eq!(
            &buf[..],
            &[0x00, 0x53, 0x13, 0xc0, 0x08, 0x04, 0x52, 0x01, 0x52, 0x0a, 0x43, 0x52, 0x0a]
        );
        let decoded: Flow = from_slice(&buf).unwrap();
        assert!(!decoded.is_link_flow());
        assert_eq!(decoded, flow);
    }

    #[test]
    fn link_flow_round_trip() {
        let flow = Flow {
            next_incoming_id: Some(7),
            incoming_window: 2048,
            next_outgoing_id: 3,
            outgoing_window: 2048,
            handle: Some(Handle(0)),
            delivery_count: Some(u32::MAX),
            link_credit: Some(5),
            available: None,
            drain: true,
            echo: false,
            properties: None,
        };
        let decoded: Flow = from_slice(&to_bytes(&flow).unwrap()).unwrap();
        assert_eq!(decoded, flow);
        assert!(decoded.is_link_flow());
    }
}
