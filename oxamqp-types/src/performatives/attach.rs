use oxamqp_codec::{
    primitives::{Array, OrderedMap, Symbol},
    macros::{DeserializeComposite, SerializeComposite},
};

use crate::{
    definitions::{
        DeliveryTag, Fields, Handle, ReceiverSettleMode, Role, SenderSettleMode, SequenceNo,
    },
    messaging::{DeliveryState, Source, Target},
};

/// 2.7.3 Attach
///
/// Attach a link to a session.
/// <type name="attach" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:attach:list" code="0x00000000:0x00000012"/>
/// </type>
#[derive(Debug, Clone, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:attach:list",
    code = "0x0000_0000:0x0000_0012",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Attach {
    /// <field name="name" type="string" mandatory="true"/>
    pub name: String,

    /// <field name="handle" type="handle" mandatory="true"/>
    pub handle: Handle,

    /// <field name="role" type="role" mandatory="true"/>
    pub role: Role,

    /// <field name="snd-settle-mode" type="sender-settle-mode" default="mixed"/>
    #[amqp_contract(default)]
    pub snd_settle_mode: SenderSettleMode,

    /// <field name="rcv-settle-mode" type="receiver-settle-mode" default="first"/>
    #[amqp_contract(default)]
    pub rcv_settle_mode: ReceiverSettleMode,

    /// <field name="source" type="*" requires="source"/>
    pub source: Option<Box<Source>>,

    /// <field name="target" type="*" requires="target"/>
    pub target: Option<Box<Target>>,

    /// <field name="unsettled" type="map"/>
    pub unsettled: Option<OrderedMap<DeliveryTag, DeliveryState>>,

    /// <field name="incomplete-unsettled" type="boolean" default="false"/>
    #[amqp_contract(default)]
    pub incomplete_unsettled: bool,

    /// <field name="initial-delivery-count" type="sequence-no"/>
    ///
    /// This MUST NOT be null if role is sender, and it is ignored if the role is receiver.
    pub initial_delivery_count: Option<SequenceNo>,

    /// <field name="max-message-size" type="ulong"/>
    pub max_message_size: Option<u64>,

    /// <field name="offered-capabilities" type="symbol" multiple="true"/>
    pub offered_capabilities: Option<Array<Symbol>>,

    /// <field name="desired-capabilities" type="symbol" multiple="true"/>
    pub desired_capabilities: Option<Array<Symbol>>,

    /// <field name="properties" type="fields"/>
    pub properties: Option<Fields>,
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes};

    use super::*;

    #[test]
    fn sender_attach_round_trip() {
        let attach = Attach {
            name: "sender-link-1".into(),
            handle: Handle(0),
            role: Role::Sender,
            snd_settle_mode: SenderSettleMode::Mixed,
            rcv_settle_mode: ReceiverSettleMode::Second,
            source: Some(Box::new(Source::default())),
            target: Some(Box::new(Target::with_address("q1"))),
            unsettled: None,
            incomplete_unsettled: false,
            initial_delivery_count: Some(0),
            max_message_size: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        };
        let buf = to_bytes(&attach).unwrap();
        let decoded: Attach = from_slice(&buf).unwrap();
        assert_eq!(decoded, attach);
    }

    #[test]
    fn missing_role_is_reported() {
        // name and handle only
        let buf = [0x00, 0x53, 0x12, 0xc0, 0x05, 0x02, 0xa1, 0x01, b'l', 0x43];
        let err = from_slice::<Attach>(&buf).unwrap_err();
        assert_eq!(
            err,
oxamqp_codec::Error::MissingField { field: "role" }
        );
    }
}
