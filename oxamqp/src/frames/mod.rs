//! AMQP frames and the frame codec

use std::io;

pub mod amqp;

/// Frame type of an AMQP frame
pub const FRAME_TYPE_AMQP: u8 = 0x00;

/// Size of the fixed frame header
pub const FRAME_HEADER_SIZE: usize = 8;

/// Errors of the frame codec
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The frame body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] oxamqp_codec::Error),

    /// A performative could not be encoded
    #[error("Encode error: {0}")]
    Encode(oxamqp_codec::Error),

    /// The declared frame size is larger than the negotiated max-frame-size
    #[error("Frame size {size} exceeds max frame size {max}")]
    FrameSizeExceeded {
        /// Declared size
        size: usize,
        /// Negotiated limit
        max: usize,
    },

    /// The frame header is malformed (size or data offset below the minimum)
    #[error("Malformed frame header: size {size}, doff {doff}")]
    MalformedHeader {
        /// Declared size
        size: usize,
        /// Data offset
        doff: u8,
    },

    /// A frame carried a type other than AMQP
    #[error("Unexpected frame type {0:#04x}")]
    UnexpectedFrameType(u8),
}
