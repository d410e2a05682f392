//! Custom error

use std::fmt::Display;

use serde::{de, ser};

use crate::format_code::EncodingCodes;

/// Errors raised while decoding (and, rarely, encoding) AMQP 1.0 types
///
/// Every decoding error carries the offset, relative to the start of the buffer handed to the
/// [`Reader`](crate::Reader), at which the problem was found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The byte at `offset` is not a known constructor
    #[error("Invalid format code 0x{code:02x} at offset {offset}")]
    InvalidFormatCode {
        /// Offset of the offending byte
        offset: usize,
        /// The unknown byte
        code: u8,
    },

    /// The buffer ended before the value was complete
    #[error("Unexpected end of buffer at offset {offset}, {needed} more byte(s) needed")]
    UnexpectedEof {
        /// Offset where the read was attempted
        offset: usize,
        /// Number of missing bytes
        needed: usize,
    },

    /// The constructor found does not encode the requested type
    #[error("Expecting {expected} at offset {offset}, found {found}")]
    TypeMismatch {
        /// Offset of the constructor
        offset: usize,
        /// Name of the expected AMQP type
        expected: &'static str,
        /// Constructor that was found instead
        found: EncodingCodes,
    },

    /// A string or symbol is not valid UTF-8/ASCII
    #[error("Invalid {expected} bytes at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the payload
        offset: usize,
        /// "string" or "symbol"
        expected: &'static str,
    },

    /// A char payload is not a unicode scalar value
    #[error("Invalid char 0x{value:08x} at offset {offset}")]
    InvalidChar {
        /// Offset of the payload
        offset: usize,
        /// The decoded UTF-32 value
        value: u32,
    },

    /// A described type carries a descriptor other than the expected one
    #[error("Descriptor mismatch at offset {offset}, expecting {expected}")]
    DescriptorMismatch {
        /// Offset of the descriptor
        offset: usize,
        /// Symbolic name of the expected descriptor
        expected: &'static str,
    },

    /// A mandatory field of a composite type is absent or null
    #[error("Mandatory field {field} is missing")]
    MissingField {
        /// Name of the field, e.g. `incoming-window`
        field: &'static str,
    },

    /// A restricted type holds a value outside of its choices
    #[error("Invalid value for {expected} at offset {offset}")]
    InvalidValue {
        /// Offset of the value
        offset: usize,
        /// Name of the restricted type
        expected: &'static str,
    },

    /// The declared size or count of a compound value does not match its content
    #[error("Size or count of compound value at offset {offset} does not match its content")]
    LengthMismatch {
        /// Offset of the compound constructor
        offset: usize,
    },

    /// An array holds elements of more than one type
    #[error("Array elements must share the constructor {expected}")]
    HeterogeneousArray {
        /// Constructor of the first element
        expected: EncodingCodes,
    },

    /// A `Deserialize` implementation rejected the value found at `offset`
    #[error("{message} at offset {offset}")]
    Invalid {
        /// Offset of the rejected value
        offset: usize,
        /// Message of the implementation
        message: String,
    },

    /// Custom error raised by a `Serialize` or `Deserialize` implementation
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Offset associated with the error, if any
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::InvalidFormatCode { offset, .. }
            | Error::UnexpectedEof { offset, .. }
            | Error::TypeMismatch { offset, .. }
            | Error::InvalidUtf8 { offset, .. }
            | Error::InvalidChar { offset, .. }
            | Error::DescriptorMismatch { offset, .. }
            | Error::InvalidValue { offset, .. }
            | Error::Invalid { offset, .. }
            | Error::LengthMismatch { offset } => Some(*offset),
            Error::MissingField { .. } | Error::HeterogeneousArray { .. } | Error::Message(_) => {
                None
            }
        }
    }

    /// Attaches `offset` to a custom error that does not carry one yet
    pub(crate) fn located(self, offset: usize) -> Self {
        match self {
            Error::Message(message) => Error::Invalid { offset, message },
            other => other,
        }
    }
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Message(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Message(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}
