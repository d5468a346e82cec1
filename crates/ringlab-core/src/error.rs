use thiserror::Error;

use ringlab_chord::ChordError;
use ringlab_pastry::PastryError;
use ringlab_transport::{PeerId, TransportError};

/// The five kinds of failure a `Dht` operation can surface, regardless of
/// which protocol backs it. An absent key is not among them - `lookup`
/// returns an empty value list, not an error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("peer {0} is not known to this ring")]
    UnknownPeer(PeerId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("peer {0} has not completed initialization")]
    NotInitialized(PeerId),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ChordError> for Error {
    fn from(err: ChordError) -> Self {
        match err {
            ChordError::InvalidConfig(msg) => Error::InvalidConfig(msg),
            ChordError::UnknownPeer(id) => Error::UnknownPeer(id),
            ChordError::Transport(t) => Error::Transport(t),
            ChordError::NotInitialized(id) => Error::NotInitialized(id),
        }
    }
}

impl From<PastryError> for Error {
    fn from(err: PastryError) -> Self {
        match err {
            PastryError::InvalidConfig(msg) => Error::InvalidConfig(msg),
            PastryError::UnknownPeer(id) => Error::UnknownPeer(id),
            PastryError::Transport(t) => Error::Transport(t),
            PastryError::NotInitialized(id) => Error::NotInitialized(id),
        }
    }
}
