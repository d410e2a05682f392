//! Definition of the primitive types

mod array;
mod decimal;
mod map;
mod symbol;
mod timestamp;
mod uuid;

pub use self::array::{Array, ArrayElement};
pub use self::decimal::{Dec128, Dec32, Dec64};
pub use self::map::OrderedMap;
pub use self::symbol::Symbol;
pub use self::timestamp::Timestamp;
pub use self::uuid::Uuid;

/// Represents a true or false value
///
/// encoding codes = 0x56 (one byte payload), 0x41 (true), 0x42 (false)
pub type Boolean = bool;

/// Integer in the range 0 to 2^8-1 inclusive
pub type UByte = u8;

/// Integer in the range 0 to 2^16-1 inclusive
pub type UShort = u16;

/// Integer in the range 0 to 2^32-1 inclusive
///
/// encoding codes = 0x70, 0x52 (smalluint), 0x43 (uint0)
pub type UInt = u32;

/// Integer in the range 0 to 2^64-1 inclusive
///
/// encoding codes = 0x80, 0x53 (smallulong), 0x44 (ulong0)
pub type ULong = u64;

/// Integer in the range -(2^7) to 2^7-1 inclusive
pub type Byte = i8;

/// Integer in the range -(2^15) to 2^15-1 inclusive
pub type Short = i16;

/// Integer in the range -(2^31) to 2^31-1 inclusive
///
/// encoding codes = 0x71, 0x54 (smallint)
pub type Int = i32;

/// Integer in the range -(2^63) to 2^63-1 inclusive
///
/// encoding codes = 0x81, 0x55 (smalllong)
pub type Long = i64;

/// 32-bit floating point number (IEEE 754-2008 binary32)
pub type Float = f32;

/// 64-bit floating point number (IEEE 754-2008 binary64)
pub type Double = f64;

/// A sequence of octets
///
/// Decoded binaries share the receive buffer instead of copying out of it.
pub type Binary = bytes::Bytes;
