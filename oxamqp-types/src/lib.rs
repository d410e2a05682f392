#![deny(missing_docs, missing_debug_implementations)]

//! Implements the AMQP 1.0 data types the protocol engine exchanges, as defined in the
//! [specification](http://docs.oasis-open.org/amqp/core/v1.0/os/amqp-core-overview-v1.0-os.html).

pub mod definitions;
pub mod messaging;
pub mod performatives;
pub mod registry;
pub mod states;

pub use oxamqp_codec as codec;
