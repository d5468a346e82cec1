//! The request/reply bus both overlays route through.
//!
//! Every protocol crate talks to peers only through the [`Transport`] trait
//! - it never knows whether a send lands on a function call in the same
//! process or a POST to another machine. [`InMemoryTransport`] backs the
//! single-process simulations used throughout the test suite;
//! [`HttpTransport`] (behind the `http` feature) is the interchangeable
//! networked alternative.

mod error;
mod in_memory;
mod message;
mod transport;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod server;

pub use error::{Result, TransportError};
pub use in_memory::InMemoryTransport;
pub use message::{Message, MsgType, PeerId, Reply, Stats, Value};
pub use transport::{Endpoint, Handler, Transport};

#[cfg(feature = "http")]
pub use http::HttpTransport;
#[cfg(feature = "http")]
pub use server::MessageServer;
