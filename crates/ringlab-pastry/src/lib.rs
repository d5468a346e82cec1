//! Pastry: prefix-routing over a `2^m` ring, with a leaf set deciding
//! ownership near a peer and a `rows x 2^b` routing table getting a message
//! to the right neighborhood in `O(log_{2^b} n)` hops.
//!
//! As with Chord, every peer's state lives behind its own mutex inside
//! [`PastryRing`] and no lock is held across a `Transport::send` call.

mod config;
mod error;
mod peer;
mod ring;

pub use config::PastryConfig;
pub use error::{PastryError, Result};
pub use peer::PeerState;
pub use ring::PastryRing;
