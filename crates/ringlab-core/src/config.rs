use std::time::Duration;

use ringlab_chord::ChordConfig;
use ringlab_pastry::PastryConfig;

use crate::error::{Error, Result};

/// Parameters shared by both protocols, plus the handful reserved for a
/// caller layering an orchestrator (workload generation, HTTP deployment)
/// on top of this crate.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Identifier width in bits. The ring has `2^m` positions.
    pub m: u32,
    /// Pastry digit width; ignored by Chord.
    pub b: u32,
    /// Half the Pastry leaf-set size (`L / 2`); ignored by Chord.
    pub leaf_half: usize,
    /// Order of each peer's local B+ tree index.
    pub btree_order: usize,
    /// Timeout a caller should give `HttpTransport` when this config backs
    /// an HTTP deployment. Not consulted by the in-memory path.
    pub http_timeout: Duration,
    /// Reserved for callers that layer deterministic workload generation on
    /// top of this crate; unused here.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            m: 16,
            b: 4,
            leaf_half: 4,
            btree_order: 4,
            http_timeout: Duration::from_secs(5),
            seed: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.m == 0 || self.m > 64 {
            return Err(Error::InvalidConfig(format!("m must be in 1..=64, got {}", self.m)));
        }
        if self.b == 0 || self.b > self.m {
            return Err(Error::InvalidConfig(format!("b must be in 1..={}, got {}", self.m, self.b)));
        }
        if self.leaf_half == 0 {
            return Err(Error::InvalidConfig("leaf_half must be at least 1".to_string()));
        }
        if self.btree_order < 3 {
            return Err(Error::InvalidConfig(format!(
                "btree_order must be at least 3, got {}",
                self.btree_order
            )));
        }
        Ok(())
    }

    pub(crate) fn chord_config(&self) -> ChordConfig {
        ChordConfig {
            m: self.m,
            btree_order: self.btree_order,
        }
    }

    pub(crate) fn pastry_config(&self) -> PastryConfig {
        PastryConfig {
            m: self.m,
            b: self.b,
            leaf_half: self.leaf_half,
            btree_order: self.btree_order,
        }
    }
}
