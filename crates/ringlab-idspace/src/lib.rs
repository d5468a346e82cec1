//! Identifier-space arithmetic for the ring.
//!
//! Every peer and key in the lab lives on a circle of `2^m` identifiers. This
//! crate is the one place that circle's arithmetic is defined: hashing keys
//! onto it, measuring distance around it, testing arc membership, and (for
//! Pastry) carving an id into base-`2^b` digits. Chord and Pastry each build
//! their own routing state on top of these primitives but never redefine
//! them - that's the point of factoring them out.
//!
//! All functions here are pure and stateless; nothing in this crate holds a
//! peer's routing state.

mod arc;
mod digits;
mod hash;

pub use arc::in_range;
pub use digits::{digit_count, digits_base_2b, shared_prefix_length};
pub use hash::hash_key;

/// An identifier on the `2^m` ring. A plain alias rather than a newtype: every
/// downstream crate needs to do ordinary modular arithmetic on these (`+`,
/// `%`, comparisons), and a wrapper buys no safety here since `m` itself is
/// only known at runtime.
pub type Id = u64;

/// Reduce `v` modulo `2^m`. `m` up to 64 is supported; larger values of `m`
/// are rejected by callers before they ever reach here (see
/// `ringlab-core::Config::validate`).
pub const fn mod_pow2(v: u64, m: u32) -> u64 {
    if m >= 64 {
        v
    } else {
        v & ((1u64 << m) - 1)
    }
}

/// Clockwise distance from `a` to `b` around the `2^m` ring: how far you'd
/// walk from `a` to reach `b` going in the direction of increasing ids,
/// wrapping past `2^m - 1` back to `0`.
pub fn clockwise_distance(a: Id, b: Id, m: u32) -> u64 {
    mod_pow2(b.wrapping_sub(a), m)
}

/// Shortest distance between `a` and `b` around the ring, in either
/// direction.
pub fn circular_distance(a: Id, b: Id, m: u32) -> u64 {
    let d = clockwise_distance(a, b, m);
    // `ring_size` is 2^m reduced mod 2^64: exactly 0 when m == 64, which makes
    // `ring_size.wrapping_sub(d)` compute `2^m - d` correctly in both cases.
    let ring_size = if m >= 64 { 0u64 } else { 1u64 << m };
    d.min(ring_size.wrapping_sub(d))
}
