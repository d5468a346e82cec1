use std::sync::Arc;

use ringlab_chord::ChordRing;
use ringlab_pastry::PastryRing;
use ringlab_transport::{PeerId, Stats, Transport, Value};

use crate::config::Config;
use crate::error::{Error, Result};

/// The one DHT contract both protocols satisfy. Each variant wraps its own
/// ring and forwards every operation to it - no behavior lives here beyond
/// picking a default source peer when the caller doesn't name one and
/// translating each protocol's error type into [`Error`].
pub enum Dht {
    Chord(Arc<ChordRing>),
    Pastry(Arc<PastryRing>),
}

impl Dht {
    pub fn chord(transport: Arc<dyn Transport>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Dht::Chord(ChordRing::new(transport, config.chord_config())?))
    }

    pub fn pastry(transport: Arc<dyn Transport>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Dht::Pastry(PastryRing::new(transport, config.pastry_config())?))
    }

    pub fn all_node_ids(&self) -> Vec<PeerId> {
        match self {
            Dht::Chord(ring) => ring.all_node_ids(),
            Dht::Pastry(ring) => ring.all_node_ids(),
        }
    }

    pub fn stats(&self) -> Stats {
        match self {
            Dht::Chord(ring) => ring.stats(),
            Dht::Pastry(ring) => ring.stats(),
        }
    }

    pub fn reset_counters(&self) {
        match self {
            Dht::Chord(ring) => ring.reset_counters(),
            Dht::Pastry(ring) => ring.reset_counters(),
        }
    }

    fn arbitrary_peer(&self) -> Result<PeerId> {
        self.all_node_ids()
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidConfig("no peers registered".to_string()))
    }

    pub fn build(&self, node_ids: &[PeerId], initial_items: &[(String, Value)]) -> Result<()> {
        if node_ids.is_empty() {
            return Err(Error::InvalidConfig("build requires at least one node id".to_string()));
        }
        tracing::info!(peers = node_ids.len(), bindings = initial_items.len(), "build: bootstrapping ring");
        match self {
            Dht::Chord(ring) => Ok(ring.build(node_ids, initial_items)?),
            Dht::Pastry(ring) => Ok(ring.build(node_ids, initial_items)?),
        }
    }

    pub fn lookup(&self, key: &str, source: Option<PeerId>) -> Result<(Vec<Value>, u64)> {
        let source = source.map(Ok).unwrap_or_else(|| self.arbitrary_peer())?;
        match self {
            Dht::Chord(ring) => Ok(ring.lookup(source, key)?),
            Dht::Pastry(ring) => Ok(ring.lookup(source, key)?),
        }
    }

    pub fn insert(&self, key: &str, value: Value, source: Option<PeerId>) -> Result<u64> {
        let source = source.map(Ok).unwrap_or_else(|| self.arbitrary_peer())?;
        match self {
            Dht::Chord(ring) => Ok(ring.insert(source, key, value)?),
            Dht::Pastry(ring) => Ok(ring.insert(source, key, value)?),
        }
    }

    /// Deletes the whole binding for `key`, matching the core API's
    /// signature. To drop a single value out of a multi-valued key, use
    /// [`Dht::delete_value`].
    pub fn delete(&self, key: &str, source: Option<PeerId>) -> Result<u64> {
        let source = source.map(Ok).unwrap_or_else(|| self.arbitrary_peer())?;
        match self {
            Dht::Chord(ring) => Ok(ring.delete(source, key, None)?),
            Dht::Pastry(ring) => Ok(ring.delete(source, key, None)?),
        }
    }

    /// Removes one value from `key`'s list, leaving the rest - the
    /// supplemental local-index capability, not part of the core API but
    /// reachable through it.
    pub fn delete_value(&self, key: &str, value: Value, source: Option<PeerId>) -> Result<u64> {
        let source = source.map(Ok).unwrap_or_else(|| self.arbitrary_peer())?;
        match self {
            Dht::Chord(ring) => Ok(ring.delete(source, key, Some(value))?),
            Dht::Pastry(ring) => Ok(ring.delete(source, key, Some(value))?),
        }
    }

    pub fn update(&self, key: &str, value: Value, source: Option<PeerId>) -> Result<u64> {
        let source = source.map(Ok).unwrap_or_else(|| self.arbitrary_peer())?;
        match self {
            Dht::Chord(ring) => Ok(ring.update(source, key, value)?),
            Dht::Pastry(ring) => Ok(ring.update(source, key, value)?),
        }
    }

    pub fn join(&self, new_id: PeerId) -> Result<u64> {
        tracing::debug!(peer = new_id, "facade: dispatching join");
        match self {
            Dht::Chord(ring) => Ok(ring.join(new_id)?),
            Dht::Pastry(ring) => Ok(ring.join(new_id)?),
        }
    }

    pub fn leave(&self, id: PeerId, graceful: bool) -> Result<u64> {
        tracing::debug!(peer = id, graceful, "facade: dispatching leave");
        match self {
            Dht::Chord(ring) => Ok(ring.leave(id, graceful)?),
            Dht::Pastry(ring) => Ok(ring.leave(id, graceful)?),
        }
    }
}
