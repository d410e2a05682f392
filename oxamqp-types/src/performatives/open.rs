use oxamqp_codec::{
    primitives::{Array, Symbol},
    macros::{DeserializeComposite, SerializeComposite},
};

use crate::definitions::{Fields, IetfLanguageTag, Milliseconds};

/// 2.7.1 Open
///
/// Negotiate connection parameters.
/// <type name="open" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:open:list" code="0x00000000:0x00000010"/>
/// </type>
#[derive(Debug, Clone, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:open:list",
    code = "0x0000_0000:0x0000_0010",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Open {
    /// <field name="container-id" type="string" mandatory="true"/>
    pub container_id: String,

    /// <field name="hostname" type="string"/>
    pub hostname: Option<String>,

    /// <field name="max-frame-size" type="uint" default="4294967295"/>
    #[amqp_contract(default = "u32::MAX")]
    pub max_frame_size: u32,

    /// <field name="channel-max" type="ushort" default="65535"/>
    #[amqp_contract(default = "u16::MAX")]
    pub channel_max: u16,

    /// <field name="idle-time-out" type="milliseconds"/>
    pub idle_time_out: Option<Milliseconds>,

    /// <field name="outgoing-locales" type="ietf-language-tag" multiple="true"/>
    pub outgoing_locales: Option<Array<IetfLanguageTag>>,

    /// <field name="incoming-locales" type="ietf-language-tag" multiple="true"/>
    pub incoming_locales: Option<Array<IetfLanguageTag>>,

    /// <field name="offered-capabilities" type="symbol" multiple="true"/>
    pub offered_capabilities: Option<Array<Symbol>>,

    /// <field name="desired-capabilities" type="symbol" multiple="true"/>
    pub desired_capabilities: Option<Array<Symbol>>,

    /// <field name="properties" type="fields"/>
    pub properties: Option<Fields>,
}

impl Open {
    /// An open with only the container id set
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            hostname: None,
            max_frame_size: u32::MAX,
            channel_max: u16::MAX,
            idle_time_out: None,
            outgoing_locales: None,
            incoming_locales: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes};

    use super::*;

    #[test]
    fn open_matches_wire_bytes() {
        let open = Open {
            hostname: Some("127.0.0.1".into()),
            max_frame_size: 1000,
            channel_max: 9,
            idle_time_out: Some(5),
            ..Open::new("1234")
        };
        let expected = [
            0x00, 0x53, 0x10, 0xc0, 0x1c, 0x05, 0xa1, 0x04, 0x31, 0x32, 0x33, 0x34, 0xa1, 0x09,
            0x31, 0x32, 0x37, 0x2e, 0x30, 0x2e, 0x30, 0x2e, 0x31, 0x70, 0x00, 0x00, 0x03, 0xe8,
            0x60, 0x00, 0x09, 0x52, 0x05,
        ];
        let buf = to_bytes(&open).unwrap();
        assert_eq!(&buf[..], &expected);
        assert_eq!(from_slice::<Open>(&expected).unwrap(), open);
    }

    #[test]
    fn omitted_limits_decode_to_defaults() {
        // container id only
        let buf = [0x00, 0x53, 0x10, 0xc0, 0x04, 0x01, 0xa1, 0x01, b'c'];
        let open: Open = from_slice(&buf).unwrap();
        assert_eq!(open.max_frame_size, u32::MAX);
        assert_eq!(open.channel_max, u16::MAX);
        assert_eq!(open.idle_time_out, None);
    }
}
