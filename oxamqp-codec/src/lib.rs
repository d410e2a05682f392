//! A serde implementation of the AMQP 1.0 type system
//!
//! [`to_bytes`] serializes any `serde::Serialize` into its AMQP encoding and [`from_slice`]
//! reads it back. Composite types are described lists, which the `SerializeComposite` and
//! `DeserializeComposite` derive macros of the `derive` feature implement from a struct.
//!
//! ```rust
//! use oxamqp_codec::{from_slice, to_bytes, primitives::Symbol, Value};
//!
//! let buf = to_bytes(&Value::Symbol(Symbol::from("amqp"))).unwrap();
//! assert_eq!(&buf[..], &[0xa3, 0x04, b'a', b'm', b'q', b'p']);
//!
//! let value: Value = from_slice(&buf).unwrap();
//! assert_eq!(value.as_str(), Some("amqp"));
//! ```
//!
//! The [`Encode`] and [`Decode`] traits are the primitive layer underneath the serializer. They
//! are also what frame payloads are read with when they must not be copied.

// lets the derive macros refer to `oxamqp_codec` from within this crate
extern crate self as oxamqp_codec;

pub mod de;
pub mod decode;
pub mod described;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod format_code;
pub mod primitives;
pub mod ser;
pub mod value;

#[doc(hidden)]
#[path = "constants.rs"]
pub mod __constants;

pub use de::{
    from_bytes, from_reader, from_reader_with_presence, from_slice, Deserializer, FieldPresence,
};
pub use decode::{Decode, Reader};
pub use described::Described;
pub use descriptor::Descriptor;
pub use encode::Encode;
pub use error::Error;
pub use ser::{to_buf, to_bytes, Serializer};
pub use value::Value;

#[doc(hidden)]
pub use serde;

#[cfg(feature = "derive")]
pub mod macros {
    //! Derive macros for composite types
    pub use oxamqp_derive::{DeserializeComposite, SerializeComposite};
}
