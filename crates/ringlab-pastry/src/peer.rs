use ringlab_index::LocalIndex;
use ringlab_transport::{PeerId, Value};

/// Lifecycle of a single peer, mirroring Chord's: `Live` is entered once the
/// peer's leaf set and routing table have actually been populated, not the
/// instant it's registered with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Uninitialized,
    Live,
    Departed,
}

/// A single peer's Pastry-specific state plus the local index it owns.
///
/// `leaf_smaller` holds the peers closest on the counter-clockwise side,
/// `leaf_larger` the clockwise side - each sorted by clockwise distance
/// to/from `id` and capped at `leaf_half` entries. `routing_table` is a
/// `rows x row_width` matrix; `routing_table[r][d]` is the known peer
/// sharing an `r`-digit prefix with `id` whose `r`-th digit is `d` (never
/// `d` equal to `id`'s own digit at that row - that cell always points at
/// `id` itself implicitly and is left `None`).
pub struct PeerRecord {
    pub id: PeerId,
    pub leaf_smaller: Vec<PeerId>,
    pub leaf_larger: Vec<PeerId>,
    pub routing_table: Vec<Vec<Option<PeerId>>>,
    pub index: LocalIndex<Value>,
    pub state: PeerState,
}

impl PeerRecord {
    pub fn new(id: PeerId, rows: usize, row_width: usize, btree_order: usize) -> Self {
        Self {
            id,
            leaf_smaller: Vec::new(),
            leaf_larger: Vec::new(),
            routing_table: vec![vec![None; row_width]; rows],
            index: LocalIndex::new(btree_order),
            state: PeerState::Uninitialized,
        }
    }
}
