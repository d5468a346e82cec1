use ringlab_idspace::mod_pow2;
use ringlab_index::LocalIndex;
use ringlab_transport::{PeerId, Value};

/// Lifecycle of a single peer. `Live` is entered the moment both pointers
/// are set - a peer with no successor yet can't safely answer routing
/// queries about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Uninitialized,
    Live,
    Departed,
}

/// One row of a peer's finger table. `start` never changes once the peer
/// exists; `node` is a cache, refreshed by `fix_finger` or recomputed
/// wholesale on every membership change.
#[derive(Debug, Clone, Copy)]
pub struct FingerEntry {
    pub start: PeerId,
    pub node: Option<PeerId>,
}

/// A single peer's Chord-specific state plus the local index it owns.
pub struct PeerRecord {
    pub id: PeerId,
    pub successor: Option<PeerId>,
    pub predecessor: Option<PeerId>,
    pub finger_table: Vec<FingerEntry>,
    pub index: LocalIndex<Value>,
    pub state: PeerState,
}

impl PeerRecord {
    pub fn new(id: PeerId, m: u32, btree_order: usize) -> Self {
        let finger_table = (0..m)
            .map(|i| FingerEntry {
                start: mod_pow2(id.wrapping_add(1u64 << i), m),
                node: None,
            })
            .collect();
        Self {
            id,
            successor: None,
            predecessor: None,
            finger_table,
            index: LocalIndex::new(btree_order),
            state: PeerState::Uninitialized,
        }
    }

    /// Enter `Live` once both pointers are known.
    pub fn refresh_state(&mut self) {
        if self.state != PeerState::Departed
            && self.successor.is_some()
            && self.predecessor.is_some()
        {
            self.state = PeerState::Live;
        }
    }
}
