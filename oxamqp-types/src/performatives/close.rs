use oxamqp_codec::macros::{DeserializeComposite, SerializeComposite};

use crate::definitions::Error;

/// 2.7.9 Close
///
/// Signal a connection close.
/// <type name="close" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:close:list" code="0x00000000:0x00000018"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, SerializeComposite, DeserializeComposite)]
#[amqp_contract(
    name = "amqp:close:list",
    code = "0x0000_0000:0x0000_0018",
    encoding = "list",
    rename_all = "kebab-case"
)]
pub struct Close {
    /// <field name="error" type="error"/>
    pub error: Option<Error>,
}

#[cfg(test)]
mod tests {
    use oxamqp_codec::{from_slice, to_bytes};

    use super::*;
    use crate::definitions::AmqpError;

    #[test]
    fn empty_close_is_list0() {
        assert_eq!(&to_bytes(&Close::default()).unwrap()[..], &[0x00, 0x53, 0x18, 0x45]);
    }

    #[test]
    fn close_with_error_round_trip() {
        let close = Close {
            error: Some(Error::with_description(
                AmqpError::ResourceLimitExceeded,
                "idle timeout",
            )),
        };
        let decoded: Close = from_slice(&to_bytes(&close).unwrap()).unwrap();
        assert_eq!(decoded, close);
    }
}
