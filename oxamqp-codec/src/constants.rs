// Names handed to the serializer and deserializer to select an AMQP encoding that the serde
// data model cannot express. They are also used by the derive macros.
#[doc(hidden)]
pub const DESCRIBED_BASIC: &str = "AMQP1.0_DESCRIBED_BASIC";
#[doc(hidden)]
pub const DESCRIBED_LIST: &str = "AMQP1.0_DESCRIBED_LIST";
#[doc(hidden)]
pub const DESCRIPTOR: &str = "AMQP1.0_DESCRIPTOR";

/// Name of the newtype a [`Value`](crate::Value) is read through
pub const VALUE: &str = "AMQP1.0_VALUE";

/// Name of the enum whose variant is selected by the descriptor of a described value
pub const DESCRIBED_ENUM: &str = "AMQP1.0_DESCRIBED_ENUM";

pub(crate) const ARRAY: &str = "AMQP1.0_ARRAY";
pub(crate) const DECIMAL32: &str = "AMQP1.0_DECIMAL32";
pub(crate) const DECIMAL64: &str = "AMQP1.0_DECIMAL64";
pub(crate) const DECIMAL128: &str = "AMQP1.0_DECIMAL128";
pub(crate) const SYMBOL: &str = "AMQP1.0_SYMBOL";
pub(crate) const TIMESTAMP: &str = "AMQP1.0_TIMESTAMP";
pub(crate) const UUID: &str = "AMQP1.0_UUID";
