use thiserror::Error;

use ringlab_transport::{PeerId, TransportError};

#[derive(Debug, Error)]
pub enum ChordError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("peer {0} is not known to this ring")]
    UnknownPeer(PeerId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("peer {0} has not completed initialization")]
    NotInitialized(PeerId),
}

pub type Result<T> = std::result::Result<T, ChordError>;
