use std::fmt;

use oxamqp_codec::primitives::Symbol;
use serde::{Deserialize, Serialize};

macro_rules! condition_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $symbol:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Symbolic name of the condition
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $symbol,)+
                }
            }

            /// Looks up a condition by its symbolic name
            pub fn from_symbol(symbol: &str) -> Option<Self> {
                match symbol {
                    $($symbol => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

condition_enum! {
    /// 2.8.15 AMQP Error
    AmqpError {
        /// An internal error occurred
        InternalError => "amqp:internal-error",
        /// A peer attempted to work with a remote entity that does not exist
        NotFound => "amqp:not-found",
        /// A peer attempted to work with a remote entity to which it has no access
        UnauthorizedAccess => "amqp:unauthorized-access",
        /// Data could not be decoded
        DecodeError => "amqp:decode-error",
        /// A peer exceeded its resource allocation
        ResourceLimitExceeded => "amqp:resource-limit-exceeded",
        /// The peer tried to use a frame in a manner that is inconsistent with the semantics
        NotAllowed => "amqp:not-allowed",
        /// An invalid field was passed in a frame body
        InvalidField => "amqp:invalid-field",
        /// The peer tried to use functionality that is not implemented
        NotImplemented => "amqp:not-implemented",
        /// The client attempted to work with a server entity to which it has no access because
        /// another client is working with it
        ResourceLocked => "amqp:resource-locked",
        /// The client made a request that was not allowed because some precondition failed
        PreconditionFailed => "amqp:precondition-failed",
        /// A server entity the client is working with has been deleted
        ResourceDeleted => "amqp:resource-deleted",
        /// The peer sent a frame that is not permitted in the current state
        IllegalState => "amqp:illegal-state",
        /// The peer cannot send a frame because the smallest encoding does not fit the
        /// negotiated maximum frame size
        FrameSizeTooSmall => "amqp:frame-size-too-small",
    }
}

condition_enum! {
    /// 2.8.16 Connection Error
    ConnectionError {
        /// An operator intervened to close the connection for some reason
        ConnectionForced => "amqp:connection:forced",
        /// A valid frame header cannot be formed from the incoming byte stream
        FramingError => "amqp:connection:framing-error",
        /// The container is no longer available on the current connection
        Redirect => "amqp:connection:redirect",
    }
}

condition_enum! {
    /// 2.8.17 Session Error
    SessionError {
        /// The peer violated incoming window for the session
        WindowViolation => "amqp:session:window-violation",
        /// Input was received for a link that was detached with an error
        ErrantLink => "amqp:session:errant-link",
        /// An attach was received using a handle that is already in use for an attached link
        HandleInUse => "amqp:session:handle-in-use",
        /// A frame (other than attach) was received referencing a handle which is not
        /// currently in use of an attached link
        UnattachedHandle => "amqp:session:unattached-handle",
    }
}

condition_enum! {
    /// 2.8.18 Link Error
    LinkError {
        /// An operator intervened to detach for some reason
        DetachForced => "amqp:link:detach-forced",
        /// The peer sent more message transfers than currently allowed on the link
        TransferLimitExceeded => "amqp:link:transfer-limit-exceeded",
        /// The peer sent a larger message than is supported on the link
        MessageSizeExceeded => "amqp:link:message-size-exceeded",
        /// The address provided cannot be resolved to a terminus at the current container
        Redirect => "amqp:link:redirect",
        /// The link has been attached elsewhere, causing the existing attachment to be forcibly
        /// closed
        Stolen => "amqp:link:stolen",
    }
}

/// Condition of an [`Error`](super::Error), one of the standard namespaces or a custom symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCondition {
    /// `amqp:*`
    AmqpError(AmqpError),
    /// `amqp:connection:*`
    ConnectionError(ConnectionError),
    /// `amqp:session:*`
    SessionError(SessionError),
    /// `amqp:link:*`
    LinkError(LinkError),
    /// Any other symbol
    Custom(Symbol),
}

impl ErrorCondition {
    /// Symbolic name of the condition
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCondition::AmqpError(c) => c.as_str(),
            ErrorCondition::ConnectionError(c) => c.as_str(),
            ErrorCondition::SessionError(c) => c.as_str(),
            ErrorCondition::LinkError(c) => c.as_str(),
            ErrorCondition::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Symbol> for ErrorCondition {
    fn from(symbol: Symbol) -> Self {
        let s = symbol.as_str();
        if let Some(c) = AmqpError::from_symbol(s) {
            return Self::AmqpError(c);
        }
        if let Some(c) = ConnectionError::from_symbol(s) {
            return Self::ConnectionError(c);
        }
        if let Some(c) = SessionError::from_symbol(s) {
            return Self::SessionError(c);
        }
        if let Some(c) = LinkError::from_symbol(s) {
            return Self::LinkError(c);
        }
        Self::Custom(symbol)
    }
}

impl From<AmqpError> for ErrorCondition {
    fn from(c: AmqpError) -> Self {
        Self::AmqpError(c)
    }
}

impl From<ConnectionError> for ErrorCondition {
    fn from(c: ConnectionError) -> Self {
        Self::ConnectionError(c)
    }
}

impl From<SessionError> for ErrorCondition {
    fn from(c: SessionError) -> Self {
        Self::SessionError(c)
    }
}

impl From<LinkError> for ErrorCondition {
    fn from(c: LinkError) -> Self {
        Self::LinkError(c)
    }
}

impl Serialize for ErrorCondition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ErrorCondition::Custom(symbol) => symbol.serialize(serializer),
            other => Symbol::from(other.as_str()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ErrorCondition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Symbol::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxamqp_codec::{from_slice, to_bytes};

    #[test]
    fn standard_symbols_resolve_to_their_namespace() {
        let cond = ErrorCondition::from(Symbol::from("amqp:session:window-violation"));
        assert_eq!(cond, ErrorCondition::SessionError(SessionError::WindowViolation));

        let cond = ErrorCondition::from(Symbol::from("amqp:link:redirect"));
        assert_eq!(cond, ErrorCondition::LinkError(LinkError::Redirect));
    }

    #[test]
    fn custom_condition_round_trips() {
        let cond = ErrorCondition::Custom(Symbol::from("com.example:oops"));
        let decoded: ErrorCondition = from_slice(&to_bytes(&cond).unwrap()).unwrap();
        assert_eq!(decoded, cond);
    }
}
