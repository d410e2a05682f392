//! Deliveries on both ends of a link

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::FutureExt;
use oxamqp_types::{
    definitions::{serial, DeliveryNumber, DeliveryTag, MessageFormat},
    messaging::{Accepted, Outcome},
};
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

use crate::{util::Uninitialized, Payload};

use super::error::{LinkStateError, SendError};

/// Decodes an application message out of a delivery payload
pub trait MessageDecode: Sized {
    /// The error returned when the payload is not a valid message
    type Error;

    /// Decodes the complete payload
    fn decode_message(payload: Payload) -> Result<Self, Self::Error>;
}

impl<T> MessageDecode for T
where
    T: serde::de::DeserializeOwned,
{
    type Error = oxamqp_codec::Error;

    fn decode_message(payload: Payload) -> Result<Self, Self::Error> {
        oxamqp_codec::from_bytes(payload)
    }
}

/// A complete delivery taken from a receiver link
#[derive(Debug, Clone)]
pub struct Delivery {
    pub(crate) link_id: u64,
    pub(crate) delivery_id: DeliveryNumber,
    pub(crate) delivery_tag: DeliveryTag,
    pub(crate) message_format: MessageFormat,
    pub(crate) settled: bool,
    pub(crate) frames: u32,
    pub(crate) payload: Payload,
}

impl Delivery {
    /// The delivery-id assigned by the sending session
    pub fn delivery_id(&self) -> DeliveryNumber {
        self.delivery_id
    }

    /// The delivery-tag chosen by the sender
    pub fn delivery_tag(&self) -> &DeliveryTag {
        &self.delivery_tag
    }

    /// The message format code
    pub fn message_format(&self) -> MessageFormat {
        self.message_format
    }

    /// Whether the sender settled the delivery before sending it
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// The reassembled payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the delivery and returns the payload
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Decodes the payload as `M`
    pub fn decode<M: MessageDecode>(&self) -> Result<M, M::Error> {
        M::decode_message(self.payload.clone())
    }
}

/// A message waiting to be sent
#[derive(Debug, Clone)]
pub struct Sendable {
    pub(crate) payload: Payload,
    pub(crate) message_format: MessageFormat,
    pub(crate) settled: Option<bool>,
}

impl Sendable {
    /// Creates a builder for [`Sendable`]
    pub fn builder() -> Builder<Uninitialized> {
        Builder::new()
    }
}

impl<T> From<T> for Sendable
where
    T: Into<Payload>,
{
    fn from(value: T) -> Self {
        Self {
            payload: value.into(),
            message_format: 0,
            settled: None,
        }
    }
}

/// Builder of a [`Sendable`]
#[derive(Debug)]
pub struct Builder<T> {
    /// The encoded message
    pub payload: T,

    /// The message format code
    pub message_format: MessageFormat,

    /// Whether to settle the delivery before sending it. Only used if the link's sender settle
    /// mode is mixed
    pub settled: Option<bool>,
}

impl Default for Builder<Uninitialized> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<Uninitialized> {
    /// Creates a new builder
    pub fn new() -> Self {
        Self {
            payload: Uninitialized {},
            message_format: 0,
            settled: None,
        }
    }
}

impl<T> Builder<T> {
    /// The encoded message
    pub fn payload(self, payload: impl Into<Payload>) -> Builder<Payload> {
        Builder {
            payload: payload.into(),
            message_format: self.message_format,
            settled: self.settled,
        }
    }

    /// Message format code
    pub fn message_format(mut self, message_format: MessageFormat) -> Self {
        self.message_format = message_format;
        self
    }

    /// Pre-settle the delivery
    pub fn settled(mut self, settled: impl Into<Option<bool>>) -> Self {
        self.settled = settled.into();
        self
    }
}

impl Builder<Payload> {
    /// Builds the [`Sendable`]
    pub fn build(self) -> Sendable {
        Sendable {
            payload: self.payload,
            message_format: self.message_format,
            settled: self.settled,
        }
    }
}

impl From<Builder<Payload>> for Sendable {
    fn from(builder: Builder<Payload>) -> Self {
        builder.build()
    }
}

pub(crate) type OutcomeSender = oneshot::Sender<Result<Outcome, SendError>>;

#[derive(Debug)]
enum Settlement {
    Settled,
    /// Sent settled, waiting for its remaining frames to be written
    Written(oneshot::Receiver<Result<Outcome, SendError>>),
    Unsettled {
        delivery_tag: DeliveryTag,
        outcome: oneshot::Receiver<Result<Outcome, SendError>>,
    },
}

pin_project! {
    /// A future for a delivery that can be `await`ed for the settlement from the receiver
    #[derive(Debug)]
    pub struct DeliveryFut {
        delivery_id: DeliveryNumber,
        settlement: Settlement,
    }
}

impl DeliveryFut {
    pub(crate) fn settled(delivery_id: DeliveryNumber) -> Self {
        Self {
            delivery_id,
            settlement: Settlement::Settled,
        }
    }

    pub(crate) fn unsettled(delivery_id: DeliveryNumber, delivery_tag: DeliveryTag) -> (Self, OutcomeSender) {
        let (tx, outcome) = oneshot::channel();
        let fut = Self {
            delivery_id,
            settlement: Settlement::Unsettled {
                delivery_tag,
                outcome,
            },
        };
        (fut, tx)
    }

    pub(crate) fn written(delivery_id: DeliveryNumber) -> (Self, OutcomeSender) {
        let (tx, outcome) = oneshot::channel();
        let fut = Self {
            delivery_id,
            settlement: Settlement::Written(outcome),
        };
        (fut, tx)
    }

    /// The delivery-id of the first transfer frame
    pub fn delivery_id(&self) -> DeliveryNumber {
        self.delivery_id
    }

    /// The delivery-tag, `None` if the delivery was sent settled
    pub fn delivery_tag(&self) -> Option<&DeliveryTag> {
        match &self.settlement {
            Settlement::Settled | Settlement::Written(_) => None,
            Settlement::Unsettled { delivery_tag, .. } => Some(delivery_tag),
        }
    }
}

impl Future for DeliveryFut {
    type Output = Result<Outcome, SendError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.settlement {
            Settlement::Settled => Poll::Ready(Ok(Outcome::Accepted(Accepted {}))),
            Settlement::Written(outcome) | Settlement::Unsettled { outcome, .. } => {
                match outcome.poll_unpin(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Ok(result)) => Poll::Ready(result),
                    Poll::Ready(Err(_)) => {
                        Poll::Ready(Err(SendError::State(LinkStateError::TransportClosed)))
                    }
                }
            }
        }
    }
}

/// Splits delivery-ids into the smallest number of contiguous `(first, last)` ranges
///
/// Ids are ordered by serial-number distance from the first id, which keeps ranges that
/// straddle the wrap-around point together.
pub(crate) fn contiguous_ranges(ids: &[DeliveryNumber]) -> Vec<(DeliveryNumber, DeliveryNumber)> {
    let base = match ids.first() {
        Some(base) => *base,
        None => return Vec::new(),
    };
    let mut sorted: Vec<DeliveryNumber> = ids.to_vec();
    sorted.sort_by_key(|id| serial::distance(base, *id));
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut iter = sorted.into_iter();
    if let Some(first) = iter.next() {
        let mut range = (first, first);
        for id in iter {
            if id == range.1.wrapping_add(1) {
                range.1 = id;
            } else {
                ranges.push(range);
                range = (id, id);
            }
        }
        ranges.push(range);
    }
    ranges
}
