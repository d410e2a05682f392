//! Serial number arithmetic for sequence numbers
//!
//! Sequence numbers wrap around at 2^32 and are compared as RFC-1982 serial numbers with
//! `SERIAL_BITS = 32`. Two numbers exactly 2^31 apart are not comparable, [`precedes`] returns
//! `false` in both directions for them.

use super::SequenceNo;

/// Whether `a` comes strictly before `b`
pub fn precedes(a: SequenceNo, b: SequenceNo) -> bool {
    let d = b.wrapping_sub(a);
    d != 0 && d < (1 << 31)
}

/// Whether `a` comes before or is equal to `b`
pub fn precedes_or_eq(a: SequenceNo, b: SequenceNo) -> bool {
    a == b || precedes(a, b)
}

/// Signed distance from `from` to `to`
///
/// The result is positive when `to` is ahead of `from`.
pub fn distance(from: SequenceNo, to: SequenceNo) -> i64 {
    to.wrapping_sub(from) as i32 as i64
}

/// Whether `value` lies in the inclusive range `first..=last`
pub fn in_range(value: SequenceNo, first: SequenceNo, last: SequenceNo) -> bool {
    precedes_or_eq(first, value) && precedes_or_eq(value, last)
}

/// Number of sequence numbers in the inclusive range `first..=last`
pub fn range_len(first: SequenceNo, last: SequenceNo) -> u64 {
    last.wrapping_sub(first) as u64 + 1
}
