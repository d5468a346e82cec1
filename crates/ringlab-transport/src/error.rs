use thiserror::Error;

use crate::message::PeerId;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is not registered with this transport")]
    UnknownPeer(PeerId),

    #[cfg(feature = "http")]
    #[error("http request to peer {peer} failed: {source}")]
    Http {
        peer: PeerId,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer {0} returned a reply the transport could not decode")]
    MalformedReply(PeerId),
}

pub type Result<T> = std::result::Result<T, TransportError>;
