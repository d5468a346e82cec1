use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use ringlab_idspace::{hash_key, in_range, mod_pow2};
use ringlab_transport::{Endpoint, Message, MsgType, PeerId, Reply, Stats, Transport, Value};
use serde::{Deserialize, Serialize};

use crate::config::ChordConfig;
use crate::error::{ChordError, Result};
use crate::peer::{PeerRecord, PeerState};

type PeerMap = HashMap<PeerId, Arc<Mutex<PeerRecord>>>;

/// Wire shape for a batch of handed-off bindings - used by both
/// `transfer_keys` (join) and the all-items dump a graceful `leave` or an
/// external inspector might ask for.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransferredBinding {
    key: String,
    values: Vec<Value>,
}

/// Smallest id in `sorted` that is `>= target`, wrapping to the first id if
/// none is - the omniscient successor lookup `build` and finger-table
/// reconstruction use instead of sending messages.
fn static_successor(sorted: &[PeerId], target: PeerId) -> PeerId {
    match sorted.binary_search(&target) {
        Ok(idx) => sorted[idx],
        Err(idx) => sorted[idx % sorted.len()],
    }
}

/// A full Chord ring: every peer's routing state, plus the transport they
/// all forward through.
///
/// Peers this instance hosts live in `peers`; anything else is reached
/// purely via `transport.send`, so the same code runs whether the ring is
/// one process talking to itself over [`ringlab_transport::InMemoryTransport`]
/// or split across processes behind [`ringlab_transport::HttpTransport`].
pub struct ChordRing {
    config: ChordConfig,
    transport: Arc<dyn Transport>,
    peers: Mutex<PeerMap>,
    self_ref: Weak<ChordRing>,
}

impl ChordRing {
    pub fn new(transport: Arc<dyn Transport>, config: ChordConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new_cyclic(|weak| Self {
            config,
            transport,
            peers: Mutex::new(HashMap::new()),
            self_ref: weak.clone(),
        }))
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("ChordRing always holds a strong reference to itself while reachable")
    }

    pub fn config(&self) -> ChordConfig {
        self.config
    }

    pub fn stats(&self) -> Stats {
        self.transport.stats()
    }

    pub fn reset_counters(&self) {
        self.transport.reset_counters();
    }

    pub fn all_node_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn normalize(&self, id: PeerId) -> PeerId {
        mod_pow2(id, self.config.m)
    }

    fn peer_arc(&self, id: PeerId) -> Result<Arc<Mutex<PeerRecord>>> {
        self.peers.lock().unwrap().get(&id).cloned().ok_or(ChordError::UnknownPeer(id))
    }

    fn register_peer(&self, id: PeerId) {
        let record = PeerRecord::new(id, self.config.m, self.config.btree_order);
        self.peers.lock().unwrap().insert(id, Arc::new(Mutex::new(record)));
        let ring = self.arc();
        self.transport
            .register(id, Endpoint::local(Box::new(move |msg| ring.handle_message(id, msg))));
    }

    fn rebuild_finger_tables(&self) {
        let ids = self.all_node_ids();
        let peers = self.peers.lock().unwrap();
        for rec_arc in peers.values() {
            let mut rec = rec_arc.lock().unwrap();
            for finger in &mut rec.finger_table {
                finger.node = Some(static_successor(&ids, finger.start));
            }
        }
    }

    // ---- routing ----

    fn closest_preceding_node(&self, rec: &PeerRecord, target: PeerId) -> PeerId {
        for finger in rec.finger_table.iter().rev() {
            if let Some(node) = finger.node {
                if node != rec.id && in_range(node, rec.id, target, false, false) {
                    return node;
                }
            }
        }
        rec.id
    }

    /// Resolve `target`'s successor as seen from peer `at`, forwarding
    /// through the transport (and counting one hop per forward) whenever
    /// `at` isn't already the answer.
    pub fn find_successor(&self, at: PeerId, target: PeerId) -> Result<PeerId> {
        let target = self.normalize(target);
        let (successor, closest) = {
            let rec_arc = self.peer_arc(at)?;
            let rec = rec_arc.lock().unwrap();
            let successor = rec.successor.ok_or(ChordError::NotInitialized(at))?;
            if in_range(target, rec.id, successor, false, true) {
                return Ok(successor);
            }
            (successor, self.closest_preceding_node(&rec, target))
        };
        if closest == at {
            return Ok(successor);
        }
        let msg = Message::new(MsgType::FindSuccessor, at, closest)
            .with_data("target_id", serde_json::json!(target));
        let reply = self.transport.send(msg, true)?;
        Ok(reply.peer.expect("find_successor handler always replies with a peer"))
    }

    fn resolve_owner(&self, source: PeerId, key: &str) -> Result<PeerId> {
        let id = hash_key(key, self.config.m);
        self.find_successor(source, id)
    }

    // ---- message handling ----

    fn handle_message(&self, id: PeerId, msg: Message) -> Reply {
        match msg.msg_type {
            MsgType::FindSuccessor => {
                let target = msg.data.get("target_id").and_then(|v| v.as_u64()).unwrap_or(msg.dst);
                match self.find_successor(id, target) {
                    Ok(peer) => Reply::ok().with_peer(peer),
                    Err(err) => {
                        tracing::warn!(peer = id, %err, "find_successor handler failed");
                        Reply::default()
                    }
                }
            }
            MsgType::GetPredecessor => match self.peer_arc(id) {
                Ok(rec) => match rec.lock().unwrap().predecessor {
                    Some(p) => Reply::ok().with_peer(p),
                    None => Reply::default(),
                },
                Err(_) => Reply::default(),
            },
            MsgType::GetSuccessor => match self.peer_arc(id) {
                Ok(rec) => match rec.lock().unwrap().successor {
                    Some(s) => Reply::ok().with_peer(s),
                    None => Reply::default(),
                },
                Err(_) => Reply::default(),
            },
            MsgType::Notify => {
                self.handle_notify(id, msg.src);
                Reply::ok()
            }
            MsgType::TransferKeys => {
                let start = msg.data.get("start").and_then(|v| v.as_u64());
                let end = msg.data.get("end").and_then(|v| v.as_u64());
                match (start, end) {
                    (Some(start), Some(end)) => match self.transfer_keys_local(id, start, end) {
                        Ok(bindings) => Reply::ok().with_data(
                            "bindings",
                            serde_json::to_value(bindings).expect("transferred bindings always serialize"),
                        ),
                        Err(_) => Reply::default(),
                    },
                    _ => Reply::default(),
                }
            }
            MsgType::Lookup => match self.peer_arc(id) {
                Ok(rec) => {
                    let values = msg.key.as_deref().map(|k| rec.lock().unwrap().index.get(k)).unwrap_or_default();
                    Reply::ok().with_values(values)
                }
                Err(_) => Reply::default(),
            },
            MsgType::Insert => match (self.peer_arc(id), msg.key, msg.value) {
                (Ok(rec), Some(key), Some(value)) => {
                    rec.lock().unwrap().index.put(&key, value);
                    Reply::ok()
                }
                _ => Reply::default(),
            },
            MsgType::Delete => match (self.peer_arc(id), msg.key) {
                (Ok(rec), Some(key)) => {
                    let mut rec = rec.lock().unwrap();
                    match msg.value {
                        Some(value) => {
                            rec.index.delete_value(&key, &value);
                        }
                        None => {
                            rec.index.delete(&key);
                        }
                    }
                    Reply::ok()
                }
                _ => Reply::default(),
            },
            MsgType::Update => match (self.peer_arc(id), msg.key, msg.value) {
                (Ok(rec), Some(key), Some(value)) => {
                    rec.lock().unwrap().index.update(&key, vec![value]);
                    Reply::ok()
                }
                _ => Reply::default(),
            },
            MsgType::GetAllItems => match self.peer_arc(id) {
                Ok(rec) => {
                    let items = rec.lock().unwrap().index.all_items();
                    let bindings: Vec<TransferredBinding> =
                        items.into_iter().map(|(key, values)| TransferredBinding { key, values }).collect();
                    Reply::ok()
                        .with_data("bindings", serde_json::to_value(bindings).expect("bindings always serialize"))
                }
                Err(_) => Reply::default(),
            },
            MsgType::Route | MsgType::JoinRoute | MsgType::NotifyArrival => Reply::default(),
        }
    }

    fn handle_notify(&self, id: PeerId, candidate: PeerId) {
        if let Ok(rec_arc) = self.peer_arc(id) {
            let mut rec = rec_arc.lock().unwrap();
            let should_adopt = match rec.predecessor {
                None => true,
                Some(p) => in_range(candidate, p, rec.id, false, false),
            };
            if should_adopt {
                rec.predecessor = Some(candidate);
                rec.refresh_state();
            }
        }
    }

    fn transfer_keys_local(&self, at: PeerId, start: PeerId, end: PeerId) -> Result<Vec<TransferredBinding>> {
        let rec_arc = self.peer_arc(at)?;
        let mut rec = rec_arc.lock().unwrap();
        let m = self.config.m;
        let mut moved = Vec::new();
        for (key, values) in rec.index.all_items() {
            let owner_hash = hash_key(&key, m);
            if in_range(owner_hash, start, end, false, true) {
                moved.push(TransferredBinding { key, values });
            }
        }
        for binding in &moved {
            rec.index.delete(&binding.key);
        }
        Ok(moved)
    }

    // ---- client operations ----

    pub fn lookup(&self, source: PeerId, key: &str) -> Result<(Vec<Value>, u64)> {
        self.transport.reset_counters();
        let owner = self.resolve_owner(source, key)?;
        let msg = Message::new(MsgType::Lookup, source, owner).with_key(key.to_string());
        let reply = self.transport.send(msg, false)?;
        Ok((reply.values.unwrap_or_default(), self.transport.stats().total_hops))
    }

    pub fn insert(&self, source: PeerId, key: &str, value: Value) -> Result<u64> {
        self.transport.reset_counters();
        let owner = self.resolve_owner(source, key)?;
        let msg = Message::new(MsgType::Insert, source, owner).with_key(key.to_string()).with_value(value);
        self.transport.send(msg, false)?;
        Ok(self.transport.stats().total_hops)
    }

    pub fn delete(&self, source: PeerId, key: &str, value: Option<Value>) -> Result<u64> {
        self.transport.reset_counters();
        let owner = self.resolve_owner(source, key)?;
        let mut msg = Message::new(MsgType::Delete, source, owner).with_key(key.to_string());
        if let Some(value) = value {
            msg = msg.with_value(value);
        }
        self.transport.send(msg, false)?;
        Ok(self.transport.stats().total_hops)
    }

    pub fn update(&self, source: PeerId, key: &str, value: Value) -> Result<u64> {
        self.transport.reset_counters();
        let owner = self.resolve_owner(source, key)?;
        let msg = Message::new(MsgType::Update, source, owner).with_key(key.to_string()).with_value(value);
        self.transport.send(msg, false)?;
        Ok(self.transport.stats().total_hops)
    }

    // ---- bulk build ----

    pub fn build(&self, ids: &[PeerId], bindings: &[(String, Value)]) -> Result<()> {
        let mut normalized: Vec<PeerId> = ids.iter().map(|&id| self.normalize(id)).collect();
        normalized.sort_unstable();
        normalized.dedup();
        if normalized.is_empty() {
            return Ok(());
        }

        for &id in &normalized {
            self.register_peer(id);
        }

        let n = normalized.len();
        for (idx, &id) in normalized.iter().enumerate() {
            let successor = normalized[(idx + 1) % n];
            let predecessor = normalized[(idx + n - 1) % n];
            let rec_arc = self.peer_arc(id)?;
            let mut rec = rec_arc.lock().unwrap();
            rec.successor = Some(successor);
            rec.predecessor = Some(predecessor);
            for finger in &mut rec.finger_table {
                finger.node = Some(static_successor(&normalized, finger.start));
            }
            rec.refresh_state();
        }

        let source = normalized[0];
        for (key, value) in bindings {
            self.insert(source, key, value.clone())?;
        }
        Ok(())
    }

    // ---- churn ----

    pub fn join(&self, new_id: PeerId) -> Result<u64> {
        self.transport.reset_counters();
        let new_id = self.normalize(new_id);
        if self.peers.lock().unwrap().contains_key(&new_id) {
            tracing::debug!(peer = new_id, "join: already present, no-op");
            return Ok(0);
        }

        let is_first = self.peers.lock().unwrap().is_empty();
        self.register_peer(new_id);

        if is_first {
            let rec_arc = self.peer_arc(new_id)?;
            let mut rec = rec_arc.lock().unwrap();
            rec.successor = Some(new_id);
            rec.predecessor = Some(new_id);
            rec.refresh_state();
            tracing::info!(peer = new_id, "join: first peer in ring");
            return Ok(0);
        }

        let entry = *self
            .peers
            .lock()
            .unwrap()
            .keys()
            .find(|&&id| id != new_id)
            .expect("a peer other than the one just registered exists");

        let succ = self.find_successor(entry, new_id)?;
        let pred = {
            let msg = Message::new(MsgType::GetPredecessor, new_id, succ);
            let reply = self.transport.send(msg, false)?;
            reply.peer.unwrap_or(succ)
        };

        {
            let rec_arc = self.peer_arc(new_id)?;
            let mut rec = rec_arc.lock().unwrap();
            rec.successor = Some(succ);
            rec.predecessor = Some(pred);
            rec.refresh_state();
        }
        if let Ok(pred_arc) = self.peer_arc(pred) {
            pred_arc.lock().unwrap().successor = Some(new_id);
        }
        if let Ok(succ_arc) = self.peer_arc(succ) {
            succ_arc.lock().unwrap().predecessor = Some(new_id);
        }

        self.rebuild_finger_tables();
        tracing::debug!(peer = new_id, successor = succ, predecessor = pred, "join: spliced into ring");

        let transfer_msg = Message::new(MsgType::TransferKeys, new_id, succ)
            .with_data("start", serde_json::json!(pred))
            .with_data("end", serde_json::json!(new_id));
        let reply = self.transport.send(transfer_msg, false)?;
        if let Some(bindings) = reply.data.get("bindings") {
            let bindings: Vec<TransferredBinding> = serde_json::from_value(bindings.clone()).unwrap_or_default();
            let moved = bindings.len();
            if let Ok(new_rec) = self.peer_arc(new_id) {
                let mut new_rec = new_rec.lock().unwrap();
                for binding in bindings {
                    new_rec.index.update(&binding.key, binding.values);
                }
            }
            tracing::info!(peer = new_id, from = succ, bindings = moved, "join: key handoff complete");
        }

        Ok(self.transport.stats().total_hops)
    }

    pub fn leave(&self, id: PeerId, graceful: bool) -> Result<u64> {
        self.transport.reset_counters();
        let id = self.normalize(id);
        if !self.peers.lock().unwrap().contains_key(&id) {
            tracing::debug!(peer = id, "leave: not present, no-op");
            return Ok(0);
        }
        tracing::info!(peer = id, graceful, "leave: departing ring");

        let (successor, predecessor) = {
            let rec_arc = self.peer_arc(id)?;
            let rec = rec_arc.lock().unwrap();
            (rec.successor, rec.predecessor)
        };

        if graceful {
            if let Some(successor) = successor {
                if successor != id {
                    let items = {
                        let rec_arc = self.peer_arc(id)?;
                        rec_arc.lock().unwrap().index.all_items()
                    };
                    if let Ok(succ_arc) = self.peer_arc(successor) {
                        let mut succ_rec = succ_arc.lock().unwrap();
                        for (key, values) in items {
                            for value in values {
                                succ_rec.index.put(&key, value);
                            }
                        }
                    }
                }
            }
        }

        if let (Some(pred), Some(succ)) = (predecessor, successor) {
            if pred != id {
                if let Ok(pred_arc) = self.peer_arc(pred) {
                    pred_arc.lock().unwrap().successor = Some(succ);
                }
            }
            if succ != id {
                if let Ok(succ_arc) = self.peer_arc(succ) {
                    succ_arc.lock().unwrap().predecessor = Some(pred);
                }
            }
        }

        if let Ok(rec_arc) = self.peer_arc(id) {
            rec_arc.lock().unwrap().state = PeerState::Departed;
        }
        self.peers.lock().unwrap().remove(&id);
        self.transport.unregister(id);

        self.rebuild_finger_tables();
        Ok(self.transport.stats().total_hops)
    }

    // ---- optional background maintenance ----

    /// Advisory stabilization, never on the `join`/`leave` path: asks `at`'s
    /// successor for its predecessor and adopts it if it's a tighter fit,
    /// then notifies the (possibly new) successor of `at`'s existence.
    pub fn stabilize(&self, at: PeerId) -> Result<()> {
        let successor = {
            let rec_arc = self.peer_arc(at)?;
            rec_arc.lock().unwrap().successor.ok_or(ChordError::NotInitialized(at))?
        };

        let msg = Message::new(MsgType::GetPredecessor, at, successor);
        let reply = self.transport.send(msg, false)?;

        let new_successor = {
            let rec_arc = self.peer_arc(at)?;
            let mut rec = rec_arc.lock().unwrap();
            if let Some(x) = reply.peer {
                if in_range(x, at, successor, false, false) {
                    rec.successor = Some(x);
                    rec.finger_table[0].node = Some(x);
                }
            }
            rec.successor.unwrap_or(successor)
        };

        let notify_msg = Message::new(MsgType::Notify, at, new_successor);
        self.transport.send(notify_msg, false)?;
        Ok(())
    }

    /// Refresh one finger-table entry by re-running `find_successor` on its
    /// fixed `start`; advisory, like `stabilize`.
    pub fn fix_finger(&self, at: PeerId, i: usize) -> Result<()> {
        let start = {
            let rec_arc = self.peer_arc(at)?;
            let rec = rec_arc.lock().unwrap();
            rec.finger_table
                .get(i)
                .map(|f| f.start)
                .ok_or_else(|| ChordError::InvalidConfig(format!("finger index {i} out of range")))?
        };
        let resolved = self.find_successor(at, start)?;
        let rec_arc = self.peer_arc(at)?;
        let mut rec = rec_arc.lock().unwrap();
        if let Some(finger) = rec.finger_table.get_mut(i) {
            finger.node = Some(resolved);
        }
        if i == 0 {
            rec.successor = Some(resolved);
        }
        Ok(())
    }
}
