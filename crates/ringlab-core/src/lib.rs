//! The unified facade over both overlays: a `Dht` that can be backed by a
//! Chord ring or a Pastry ring behind one API, plus the shared `Config` and
//! `Error` types every caller needs regardless of which protocol it picked.
//!
//! Chord and Pastry never share an implementation - only the ID-space
//! primitives and the Local Index are common - so this crate is purely a
//! dispatch layer, not a third routing implementation.

mod config;
mod dht;
mod error;

pub use config::Config;
pub use dht::Dht;
pub use error::{Error, Result};

pub use ringlab_transport::{PeerId, Stats, Value};
