//! AMQP frame type and corresponding encoder and decoder

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use oxamqp_codec::{to_buf, Reader};
use oxamqp_types::{
    definitions::MIN_MAX_FRAME_SIZE,
    performatives::{
        Attach, Begin, Close, Detach, Disposition, End, Flow, Open, Performative, Transfer,
    },
    registry::Registry,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::Payload;

use super::{Error, FRAME_HEADER_SIZE, FRAME_TYPE_AMQP};

/// AMQP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// AMQP frame channel
    pub channel: u16,

    /// AMQP frame body
    pub body: FrameBody,
}

impl Frame {
    /// Creates a new AMQP frame
    pub fn new(channel: impl Into<u16>, body: FrameBody) -> Self {
        Self {
            channel: channel.into(),
            body,
        }
    }

    /// Get the channel of the frame
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Get the body of the frame
    pub fn body(&self) -> &FrameBody {
        &self.body
    }

    /// Consume the frame to get the frame body
    pub fn into_body(self) -> FrameBody {
        self.body
    }

    /// Creates an emtpy frame. The empty frame is only used to reset
    /// the remote idle timeout
    pub fn empty() -> Self {
        Self {
            channel: 0,
            body: FrameBody::Empty,
        }
    }
}

/// AMQP frame body
#[derive(Clone, PartialEq)]
pub enum FrameBody {
    /// Open performative
    Open(Open),

    /// Begin performative
    Begin(Begin),

    /// Attach performative
    Attach(Attach),

    /// Flow performative
    Flow(Flow),

    /// Transfer performative and payload
    Transfer {
        /// Transfer performative
        performative: Transfer,

        /// Binary payload
        payload: Payload,
    },

    /// Disposition performative
    Disposition(Disposition),

    /// Detach performative
    Detach(Detach),

    /// End performative
    End(End),

    /// Close performative
    Close(Close),

    /// An empty frame used only for resetting idle timeout
    Empty,
}

impl FrameBody {
    /// Name of the performative carried by the frame
    pub fn name(&self) -> &'static str {
        match self {
            FrameBody::Open(_) => "open",
            FrameBody::Begin(_) => "begin",
            FrameBody::Attach(_) => "attach",
            FrameBody::Flow(_) => "flow",
            FrameBody::Transfer { .. } => "transfer",
            FrameBody::Disposition(_) => "disposition",
            FrameBody::Detach(_) => "detach",
            FrameBody::End(_) => "end",
            FrameBody::Close(_) => "close",
            FrameBody::Empty => "empty",
        }
    }
}

impl From<Performative> for FrameBody {
    fn from(performative: Performative) -> Self {
        match performative {
            Performative::Open(p) => FrameBody::Open(p),
            Performative::Begin(p) => FrameBody::Begin(p),
            Performative::Attach(p) => FrameBody::Attach(p),
            Performative::Flow(p) => FrameBody::Flow(p),
            Performative::Transfer(p) => FrameBody::Transfer {
                performative: p,
                payload: Payload::new(),
            },
            Performative::Disposition(p) => FrameBody::Disposition(p),
            Performative::Detach(p) => FrameBody::Detach(p),
            Performative::End(p) => FrameBody::End(p),
            Performative::Close(p) => FrameBody::Close(p),
        }
    }
}

impl std::fmt::Debug for FrameBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(arg0) => f.debug_tuple("Open").field(arg0).finish(),
            Self::Begin(arg0) => f.debug_tuple("Begin").field(arg0).finish(),
            Self::Attach(arg0) => f.debug_tuple("Attach").field(arg0).finish(),
            Self::Flow(arg0) => f.debug_tuple("Flow").field(arg0).finish(),
            Self::Transfer {
                performative,
                payload,
            } => f
                .debug_struct("Transfer")
                .field("performative", performative)
                .field("payload.len", &payload.len())
                .finish(),
            Self::Disposition(arg0) => f.debug_tuple("Disposition").field(arg0).finish(),
            Self::Detach(arg0) => f.debug_tuple("Detach").field(arg0).finish(),
            Self::End(arg0) => f.debug_tuple("End").field(arg0).finish(),
            Self::Close(arg0) => f.debug_tuple("Close").field(arg0).finish(),
            Self::Empty => write!(f, "Empty"),
        }
    }
}

/// Encoder and decoder of the AMQP frames
///
/// The decoder rejects any frame whose declared size exceeds `max_frame_size` before reading the
/// body, and leaves the offending bytes in the buffer.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    registry: Arc<Registry>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MIN_MAX_FRAME_SIZE as usize)
    }
}

impl FrameCodec {
    /// Creates a codec that accepts frames up to `max_frame_size` bytes
    pub fn new(max_frame_size: usize) -> Self {
        Self::with_registry(max_frame_size, Arc::new(Registry::amqp()))
    }

    /// Creates a codec that resolves descriptors through `registry`
    pub fn with_registry(max_frame_size: usize, registry: Arc<Registry>) -> Self {
        Self {
            max_frame_size,
            registry,
        }
    }

    /// Maximum size of an accepted inbound frame
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Changes the maximum size of an accepted inbound frame
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// The descriptor registry used for decoding
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

fn write_header(dst: &mut BytesMut, channel: u16) {
    // AMQP frame ignores extended header, thus doff should always be 2
    dst.put_u8(2); // doff
    dst.put_u8(FRAME_TYPE_AMQP); // frame type
    dst.put_u16(channel);
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        dst.put_u32(0); // size, back-patched below
        write_header(dst, item.channel);

        let encoded = match &item.body {
            FrameBody::Open(performative) => to_buf(performative, dst),
            FrameBody::Begin(performative) => to_buf(performative, dst),
            FrameBody::Attach(performative) => to_buf(performative, dst),
            FrameBody::Flow(performative) => to_buf(performative, dst),
            FrameBody::Transfer { performative, .. } => to_buf(performative, dst),
            FrameBody::Disposition(performative) => to_buf(performative, dst),
            FrameBody::Detach(performative) => to_buf(performative, dst),
            FrameBody::End(performative) => to_buf(performative, dst),
            FrameBody::Close(performative) => to_buf(performative, dst),
            FrameBody::Empty => Ok(()),
        };
        if let Err(err) = encoded {
            dst.truncate(start);
            return Err(Error::Encode(err));
        }
        if let FrameBody::Transfer { payload, .. } = item.body {
            dst.put(payload);
        }

        let size = (dst.len() - start) as u32;
        dst[start..start + 4].copy_from_slice(&size.to_be_bytes());
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if size > self.max_frame_size {
            return Err(Error::FrameSizeExceeded {
                size,
                max: self.max_frame_size,
            });
        }
        if size < FRAME_HEADER_SIZE {
            return Err(Error::MalformedHeader { size, doff: 0 });
        }
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(size);
        frame.advance(4);
        let doff = frame.get_u8();
        let ftype = frame.get_u8();
        let channel = frame.get_u16();

        let body_offset = doff as usize * 4;
        if doff < 2 || body_offset > size {
            return Err(Error::MalformedHeader { size, doff });
        }
        if ftype != FRAME_TYPE_AMQP {
            return Err(Error::UnexpectedFrameType(ftype));
        }
        // extended header is ignored
        frame.advance(body_offset - FRAME_HEADER_SIZE);

        if frame.is_empty() {
            return Ok(Some(Frame::new(channel, FrameBody::Empty)));
        }

        let mut reader = Reader::new(frame.freeze());
        let performative = Performative::decode_with(&mut reader, &self.registry)?;
        let body = match performative {
            Performative::Transfer(performative) => FrameBody::Transfer {
                performative,
                payload: reader.split_remaining(),
            },
            other => FrameBody::from(other),
        };

        Ok(Some(Frame { channel, body }))
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use oxamqp_types::{
        definitions::{Handle, Role},
        messaging::{Accepted, DeliveryState},
        performatives::{Disposition, Open, Transfer},
    };
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Error, Frame, FrameBody, FrameCodec};

    #[test]
    fn encode_empty_frame() {
        let mut codec = FrameCodec::new(512);
        let mut dst = BytesMut::new();
        codec.encode(Frame::empty(), &mut dst).unwrap();
        assert_eq!(&dst[..], &[0x00, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_empty_frame() {
        let mut codec = FrameCodec::new(512);
        let mut src = BytesMut::from(&[0x00, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x03][..]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.channel, 3);
        assert_eq!(frame.body, FrameBody::Empty);
        assert!(src.is_empty());
    }

    #[test]
    fn encode_open_frame() {
        let open = Open {
            hostname: Some("127.0.0.1".into()),
            max_frame_size: 1000,
            channel_max: 9,
            idle_time_out: Some(5),
            ..Open::new("1234")
        };
        let mut codec = FrameCodec::new(1000);
        let mut dst = BytesMut::new();
        codec
            .encode(Frame::new(0u16, FrameBody::Open(open)), &mut dst)
            .unwrap();
        assert_eq!(&dst[..8], &[0x00, 0x00, 0x00, 0x29, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(dst.len(), 0x29);
    }

    #[test]
    fn frame_round_trip_keeps_channel_and_payload() {
        let transfer = Transfer {
            delivery_id: Some(0),
            delivery_tag: Some(Bytes::from_static(&[0, 0, 0, 0])),
            message_format: Some(0),
            ..Transfer::continuation(Handle(1), false)
        };
        let frame = Frame::new(
            7u16,
            FrameBody::Transfer {
                performative: transfer,
                payload: Bytes::from_static(b"hello"),
            },
        );
        let mut codec = FrameCodec::new(512);
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let disposition = Disposition {
            role: Role::Receiver,
            first: 0,
            last: None,
            settled: true,
            state: Some(DeliveryState::Accepted(Accepted {})),
            batchable: false,
        };
        let mut codec = FrameCodec::new(512);
        let mut full = BytesMut::new();
        codec
            .encode(Frame::new(0u16, FrameBody::Disposition(disposition)), &mut full)
            .unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), full.len() - 1);
        assert!(codec.decode(&mut full).unwrap().is_some());
    }

    #[test]
    fn oversized_frame_is_rejected_without_consuming() {
        let mut codec = FrameCodec::new(512);
        let mut src = BytesMut::from(&[0x00, 0x00, 0x02, 0x01, 0x02, 0x00, 0x00, 0x00][..]);
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(
            err,
            Error::FrameSizeExceeded {
                size: 513,
                max: 512
            }
        ));
        assert_eq!(src.len(), 8);
    }

    #[test]
    fn sasl_frame_type_is_rejected() {
        let mut codec = FrameCodec::new(512);
        let mut src = BytesMut::from(&[0x00, 0x00, 0x00, 0x08, 0x02, 0x01, 0x00, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(Error::UnexpectedFrameType(0x01))
        ));
    }

    #[test]
    fn bad_data_offset_is_rejected() {
        let mut codec = FrameCodec::new(512);
        let mut src = BytesMut::from(&[0x00, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(Error::MalformedHeader { size: 8, doff: 1 })
        ));
    }
}
