//! Wrapping sequence number comparisons.
//!
//! Sequence numbers are `u32` and compared with serial number arithmetic:
//! `a` precedes `b` when `b - a` (mod 2^32) is less than 2^31.

/// First sequence number assigned on a fresh channel.
pub const INITIAL_SEQUENCE: u32 = 1;

/// `a` comes strictly before `b`.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `a` comes before or equals `b`.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

/// `a` comes strictly after `b`.
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

/// Number of steps from `from` forward to `to`.
#[inline]
pub fn distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}
