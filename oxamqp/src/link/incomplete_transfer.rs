use bytes::{Bytes, BytesMut};
use oxamqp_types::{
    definitions::{self, AmqpError, LinkError},
    performatives::Transfer,
};

use crate::Payload;

use super::delivery::Delivery;

/// Checks that a field repeated on a continuation frame matches the first frame
macro_rules! ensure_consistent {
    ($self:ident, $other:ident, $($field:ident),*) => {
        $(
            if let Some(value) = &$other.$field {
                if *value != $self.$field {
                    return Err(definitions::Error::with_description(
                        AmqpError::InvalidField,
                        concat!("inconsistent ", stringify!($field), " in multi-frame delivery"),
                    ));
                }
            }
        )*
    };
}

/// A delivery whose transfer frames are still arriving
#[derive(Debug)]
pub(crate) struct IncompleteTransfer {
    pub delivery_id: u32,
    pub delivery_tag: Bytes,
    pub message_format: u32,
    pub settled: bool,
    pub frames: u32,
    /// Payload of each frame, kept as received
    segments: Vec<Payload>,
    len: usize,
}

impl IncompleteTransfer {
    /// Starts a delivery from its first frame
    pub fn first(transfer: &Transfer, payload: &Payload) -> Result<Self, definitions::Error> {
        let delivery_id = transfer.delivery_id.ok_or_else(|| {
            definitions::Error::with_description(
                AmqpError::InvalidField,
                "delivery-id is required on the first transfer of a delivery",
            )
        })?;
        let delivery_tag = transfer.delivery_tag.clone().ok_or_else(|| {
            definitions::Error::with_description(
                AmqpError::InvalidField,
                "delivery-tag is required on the first transfer of a delivery",
            )
        })?;

        Ok(Self {
            delivery_id,
            delivery_tag,
            message_format: transfer.message_format.unwrap_or(0),
            // If not set on the first transfer the settled flag MUST be interpreted as false
            settled: transfer.settled.unwrap_or(false),
            frames: 1,
            segments: vec![payload.clone()],
            len: payload.len(),
        })
    }

    /// Appends a continuation frame
    pub fn append(&mut self, transfer: &Transfer, payload: &Payload) -> Result<(), definitions::Error> {
        ensure_consistent!(self, transfer, delivery_id, delivery_tag, message_format);

        // Once a preceding transfer was settled the delivery stays settled
        if let Some(settled) = transfer.settled {
            self.settled |= settled;
        }
        self.len += payload.len();
        self.segments.push(payload.clone());
        self.frames += 1;
        Ok(())
    }

    pub fn ensure_within(&self, max_message_size: Option<u64>) -> Result<(), definitions::Error> {
        match max_message_size {
            Some(max) if self.len as u64 > max => Err(definitions::Error::with_description(
                LinkError::MessageSizeExceeded,
                format!("delivery of {} bytes exceeds {}", self.len, max),
            )),
            _ => Ok(()),
        }
    }

    /// Hands the payload off, concatenating only deliveries that spanned several frames
    fn take_payload(&mut self) -> Payload {
        match self.segments.len() {
            0 => Bytes::new(),
            1 => self.segments.remove(0),
            _ => {
                let mut buffer = BytesMut::with_capacity(self.len);
                for segment in self.segments.drain(..) {
                    buffer.extend_from_slice(&segment);
                }
                buffer.freeze()
            }
        }
    }

    pub fn into_delivery(mut self, link_id: u64) -> Delivery {
        let payload = self.take_payload();
        Delivery {
            link_id,
            delivery_id: self.delivery_id,
            delivery_tag: self.delivery_tag,
            message_format: self.message_format,
            settled: self.settled,
            frames: self.frames,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use oxamqp_types::{
        definitions::{AmqpError, ErrorCondition, Handle, LinkError},
        performatives::Transfer,
    };

    use super::IncompleteTransfer;

    fn first_frame(more: bool) -> Transfer {
        Transfer {
            handle: Handle(0),
            delivery_id: Some(3),
            delivery_tag: Some(Bytes::from_static(b"tag")),
            message_format: Some(0),
            settled: None,
            more,
            rcv_settle_mode: None,
            state: None,
            resume: false,
            aborted: false,
            batchable: false,
        }
    }

    #[test]
    fn frames_are_concatenated() {
        let mut incomplete =
            IncompleteTransfer::first(&first_frame(true), &Bytes::from_static(b"hello ")).unwrap();
        let mut last = Transfer::continuation(Handle(0), false);
        last.settled = Some(true);
        incomplete.append(&last, &Bytes::from_static(b"world")).unwrap();

        let delivery = incomplete.into_delivery(9);
        assert_eq!(&delivery.payload()[..], b"hello world");
        assert_eq!(delivery.frames, 2);
        assert!(delivery.is_settled());
        assert_eq!(delivery.delivery_id(), 3);
    }

    #[test]
    fn single_frame_payload_is_not_copied() {
        let payload = Bytes::from(vec![7u8; 32]);
        let incomplete = IncompleteTransfer::first(&first_frame(false), &payload).unwrap();
        let delivery = incomplete.into_delivery(1);
        assert_eq!(delivery.payload().as_ptr(), payload.as_ptr());
        assert_eq!(delivery.payload().len(), 32);
    }

    #[test]
    fn size_limit_counts_every_segment() {
        let mut incomplete =
            IncompleteTransfer::first(&first_frame(true), &Bytes::from_static(b"abc")).unwrap();
        incomplete
            .append(&Transfer::continuation(Handle(0), true), &Bytes::from_static(b"def"))
            .unwrap();
        assert!(incomplete.ensure_within(Some(6)).is_ok());
        assert!(incomplete.ensure_within(Some(5)).is_err());
        assert_eq!(incomplete.frames, 2);
    }

    #[test]
    fn first_frame_needs_delivery_id() {
        let mut transfer = first_frame(false);
        transfer.delivery_id = None;
        let err = IncompleteTransfer::first(&transfer, &Bytes::new()).unwrap_err();
        assert_eq!(err.condition, ErrorCondition::AmqpError(AmqpError::InvalidField));
    }

    #[test]
    fn inconsistent_continuation_is_rejected() {
        let mut incomplete =
            IncompleteTransfer::first(&first_frame(true), &Bytes::from_static(b"a")).unwrap();
        let mut next = Transfer::continuation(Handle(0), false);
        next.delivery_id = Some(4);
        assert!(incomplete.append(&next, &Bytes::from_static(b"b")).is_err());
    }

    #[test]
    fn message_size_is_enforced() {
        let incomplete =
            IncompleteTransfer::first(&first_frame(true), &Bytes::from_static(b"abcdef")).unwrap();
        assert!(incomplete.ensure_within(None).is_ok());
        assert!(incomplete.ensure_within(Some(6)).is_ok());
        let err = incomplete.ensure_within(Some(5)).unwrap_err();
        assert_eq!(err.condition, ErrorCondition::LinkError(LinkError::MessageSizeExceeded));
    }
}
