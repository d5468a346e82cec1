//! Chord: a one-dimensional ring, finger-table routing, and the join/leave
//! protocol that keeps the ring's successor/predecessor pointers correct as
//! peers come and go.
//!
//! Every peer's state lives behind its own mutex inside [`ChordRing`]; no
//! lock is ever held across a `Transport::send` call, so a forwarded lookup
//! never blocks an unrelated peer's handler from running concurrently.

mod config;
mod error;
mod peer;
mod ring;

pub use config::ChordConfig;
pub use error::{ChordError, Result};
pub use peer::{FingerEntry, PeerState};
pub use ring::ChordRing;
