use oxamqp_codec::macros::{DeserializeComposite, SerializeComposite};

use crate::{
    definitions::{DeliveryNumber, Role},
    messaging::DeliveryState,
};

/// 2.7.6 Disposition
///
/// Inform remote peer of delivery state changes.
/// <type name="disposition" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:disposition:list" code="0x00000000:0x00000015"/>
/// </type>
#[derive(Debug, Clone, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:disposition:list",
    code = "0x0000_0000:0x0000_0015",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Disposition {
    /// <field name="role" type="role" mandatory="true"/>
    pub role: Role,

    /// <field name="first" type="delivery-number" mandatory="true"/>
    pub first: DeliveryNumber,

    /// <field name="last" type="delivery-number"/>
    ///
    /// Absent means the range holds only `first`
    pub last: Option<DeliveryNumber>,

    /// <field name="settled" type="boolean" default="false"/>
    #[amqp_contract(default)]
    pub settled: bool,

    /// <field name="state" type="*" requires="delivery-state"/>
    pub state: Option<DeliveryState>,

    /// <field name="batchable" type="boolean" default="false"/>
    #[amqp_contract(default)]
    pub batchable: bool,
}

impl Disposition {
    /// Last delivery id covered by the range
    pub fn last_id(&self) -> DeliveryNumber {
        self.last.unwrap_or(self.first)
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes};

    use super::*;
    use crate::messaging::Accepted;

    const SETTLED_ACCEPTED: [u8; 14] = [
        0x00, 0x53, 0x15, 0xc0, 0x09, 0x05, 0x41, 0x43, 0x40, 0x41, 0x00, 0x53, 0x24, 0x45,
    ];

    #[test]
    fn encode_settled_accepted() {
        let disposition = Disposition {
            role: Role::Receiver,
            first: 0,
            last: None,
            settled: true,
            state: Some(DeliveryState::Accepted(Accepted {})),
            batchable: false,
        };
        assert_eq!(&to_bytes(&disposition).unwrap()[..], &SETTLED_ACCEPTED);
    }

    #[test]
    fn decode_settled_accepted() {
        let disposition: Disposition = from_slice(&SETTLED_ACCEPTED).unwrap();
        assert_eq!(disposition.role, Role::Receiver);
        assert_eq!(disposition.last_id(), 0);
        assert!(disposition.settled);
        assert!(matches!(disposition.state, Some(DeliveryState::Accepted(_))));
    }
}
