use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use ringlab_idspace::{circular_distance, clockwise_distance, digits_base_2b, hash_key, in_range, mod_pow2, shared_prefix_length};
use ringlab_transport::{Endpoint, Message, MsgType, PeerId, Reply, Stats, Transport, Value};
use serde::{Deserialize, Serialize};

use crate::config::PastryConfig;
use crate::error::{PastryError, Result};
use crate::peer::{PeerRecord, PeerState};

type PeerMap = HashMap<PeerId, Arc<Mutex<PeerRecord>>>;

/// Wire shape for a batch of handed-off bindings, same contract as Chord's
/// `get_all_items` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransferredBinding {
    key: String,
    values: Vec<Value>,
}

/// A full Pastry ring: every peer's leaf set and routing table, plus the
/// transport they all forward through.
///
/// Unlike Chord's single successor pointer, ownership here is decided by
/// the leaf set's span - whichever peer's leaf set brackets the target id
/// is the owner, with the routing table and a prefix-free fallback used
/// only to get a message to within the leaf set's neighborhood.
pub struct PastryRing {
    config: PastryConfig,
    transport: Arc<dyn Transport>,
    peers: Mutex<PeerMap>,
    self_ref: Weak<PastryRing>,
}

impl PastryRing {
    pub fn new(transport: Arc<dyn Transport>, config: PastryConfig) -> Result<Arc<Self>> {
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
            .expect("PastryRing always holds a strong reference to itself while reachable")
    }

    pub fn config(&self) -> PastryConfig {
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

    /// Snapshot of `id`'s leaf set as `(leaf_smaller, leaf_larger)`, for
    /// orchestrators inspecting routing state.
    pub fn leaf_set(&self, id: PeerId) -> Result<(Vec<PeerId>, Vec<PeerId>)> {
        let rec_arc = self.peer_arc(id)?;
        let rec = rec_arc.lock().unwrap();
        Ok((rec.leaf_smaller.clone(), rec.leaf_larger.clone()))
    }

    /// Snapshot of `id`'s routing table, for orchestrators inspecting
    /// routing state.
    pub fn routing_table(&self, id: PeerId) -> Result<Vec<Vec<Option<PeerId>>>> {
        let rec_arc = self.peer_arc(id)?;
        let rec = rec_arc.lock().unwrap();
        Ok(rec.routing_table.clone())
    }

    fn normalize(&self, id: PeerId) -> PeerId {
        mod_pow2(id, self.config.m)
    }

    fn peer_arc(&self, id: PeerId) -> Result<Arc<Mutex<PeerRecord>>> {
        self.peers.lock().unwrap().get(&id).cloned().ok_or(PastryError::UnknownPeer(id))
    }

    fn register_peer(&self, id: PeerId) {
        let record = PeerRecord::new(id, self.config.rows(), self.config.row_width(), self.config.btree_order);
        self.peers.lock().unwrap().insert(id, Arc::new(Mutex::new(record)));
        let ring = self.arc();
        self.transport
            .register(id, Endpoint::local(Box::new(move |msg| ring.handle_message(id, msg))));
    }

    // ---- leaf set / routing table maintenance ----

    /// Fold `other` into `rec`'s leaf set on whichever side it's closer to:
    /// `leaf_larger` if walking clockwise from `rec.id` is the shorter way
    /// round, `leaf_smaller` otherwise. Each side stays sorted by clockwise
    /// distance and capped at `leaf_half`.
    fn add_to_leaf(&self, rec: &mut PeerRecord, other: PeerId, m: u32, leaf_half: usize) {
        if other == rec.id {
            return;
        }
        let cw = clockwise_distance(rec.id, other, m);
        let ccw = clockwise_distance(other, rec.id, m);
        if cw <= ccw {
            if !rec.leaf_larger.contains(&other) {
                rec.leaf_larger.push(other);
                rec.leaf_larger.sort_by_key(|&p| clockwise_distance(rec.id, p, m));
                rec.leaf_larger.truncate(leaf_half);
            }
        } else if !rec.leaf_smaller.contains(&other) {
            rec.leaf_smaller.push(other);
            rec.leaf_smaller.sort_by_key(|&p| clockwise_distance(p, rec.id, m));
            rec.leaf_smaller.truncate(leaf_half);
        }
    }

    /// Record `other` in `rec`'s routing table row for their shared prefix
    /// length, but only if that cell is still empty - the first peer seen
    /// for a given row/digit wins, matching the original's "don't evict a
    /// working entry" behavior.
    fn add_to_routing_table(&self, rec: &mut PeerRecord, other: PeerId, m: u32, b: u32) {
        if other == rec.id {
            return;
        }
        let r = shared_prefix_length(rec.id, other, m, b) as usize;
        if r >= rec.routing_table.len() {
            return;
        }
        let digits = digits_base_2b(other, m, b);
        let d = digits[r] as usize;
        if rec.routing_table[r][d].is_none() {
            rec.routing_table[r][d] = Some(other);
        }
    }

    /// Does `target` fall on the inclusive arc from `rec`'s farthest
    /// counter-clockwise leaf to its farthest clockwise leaf? That arc
    /// always runs through `rec.id` itself, so an empty leaf set on either
    /// side collapses the bound to `rec.id` - and with both sides empty
    /// (a single-peer ring) the whole ring falls inside it.
    fn in_leaf_range(&self, rec: &PeerRecord) -> (PeerId, PeerId) {
        let lo = rec.leaf_smaller.last().copied().unwrap_or(rec.id);
        let hi = rec.leaf_larger.last().copied().unwrap_or(rec.id);
        (lo, hi)
    }

    fn owns(&self, rec: &PeerRecord, target: PeerId) -> bool {
        let (lo, hi) = self.in_leaf_range(rec);
        in_range(target, lo, hi, true, true)
    }

    /// The peer in `rec`'s leaf set (or `rec` itself) numerically closest
    /// to `target`, ties broken by the smaller id.
    fn closest_in_leaf_set(&self, rec: &PeerRecord, target: PeerId) -> PeerId {
        let m = self.config.m;
        let mut best = rec.id;
        let mut best_dist = circular_distance(rec.id, target, m);
        for &p in rec.leaf_smaller.iter().chain(rec.leaf_larger.iter()) {
            let dist = circular_distance(p, target, m);
            if dist < best_dist || (dist == best_dist && p < best) {
                best = p;
                best_dist = dist;
            }
        }
        best
    }

    /// Next hop towards `target` from `rec`, excluding anyone in
    /// `exclude` (a loop guard): the prefix-routing cell at row
    /// `shared_prefix_length(rec.id, target)`, falling back to any known
    /// peer with a strictly longer shared prefix than that row, closest by
    /// distance. `None` means `rec` itself is the best anyone here knows of.
    fn next_hop(&self, rec: &PeerRecord, target: PeerId, exclude: &HashSet<PeerId>) -> Option<PeerId> {
        let m = self.config.m;
        let b = self.config.b;
        let r = shared_prefix_length(rec.id, target, m, b) as usize;
        if let Some(row) = rec.routing_table.get(r) {
            let digits = digits_base_2b(target, m, b);
            if let Some(&d) = digits.get(r) {
                if let Some(Some(p)) = row.get(d as usize) {
                    if *p != rec.id && !exclude.contains(p) {
                        return Some(*p);
                    }
                }
            }
        }
        self.fallback_candidate(rec, target, r as u32, exclude)
    }

    /// The "rare case" fallback: among every peer `rec` knows about (leaf
    /// set plus every populated routing table cell), the one with a
    /// strictly longer shared prefix with `target` than `r`, closest by
    /// distance on ties.
    fn fallback_candidate(&self, rec: &PeerRecord, target: PeerId, r: u32, exclude: &HashSet<PeerId>) -> Option<PeerId> {
        let m = self.config.m;
        let b = self.config.b;
        let mut candidates: Vec<PeerId> = rec.leaf_smaller.iter().chain(rec.leaf_larger.iter()).copied().collect();
        for row in &rec.routing_table {
            for cell in row {
                if let Some(p) = cell {
                    candidates.push(*p);
                }
            }
        }
        let mut best: Option<(u32, u64, PeerId)> = None;
        for p in candidates {
            if p == rec.id || exclude.contains(&p) {
                continue;
            }
            let prefix = shared_prefix_length(p, target, m, b);
            if prefix <= r {
                continue;
            }
            let dist = circular_distance(p, target, m);
            let better = match best {
                None => true,
                Some((bp, bd, bid)) => prefix > bp || (prefix == bp && (dist < bd || (dist == bd && p < bid))),
            };
            if better {
                best = Some((prefix, dist, p));
            }
        }
        best.map(|(_, _, p)| p)
    }

    // ---- routing ----

    /// Resolve `target`'s owner as seen from peer `source`: leaf-set phase
    /// first, then prefix routing / fallback, forwarding through the
    /// transport (and counting one hop per forward) until some peer decides
    /// it's the owner.
    pub fn route(&self, source: PeerId, target: PeerId) -> Result<PeerId> {
        let target = self.normalize(target);
        let mut visited = HashSet::new();
        self.route_inner(source, target, &mut visited)
    }

    fn route_inner(&self, at: PeerId, target: PeerId, visited: &mut HashSet<PeerId>) -> Result<PeerId> {
        if visited.contains(&at) {
            return Ok(at);
        }
        visited.insert(at);

        let rec_arc = self.peer_arc(at)?;
        let rec = rec_arc.lock().unwrap();
        if rec.state != PeerState::Live {
            return Err(PastryError::NotInitialized(at));
        }
        if self.owns(&rec, target) {
            return Ok(self.closest_in_leaf_set(&rec, target));
        }
        let next = self.next_hop(&rec, target, visited);
        drop(rec);

        match next {
            Some(next) => {
                let msg = Message::new(MsgType::Route, at, next)
                    .with_data("target_id", serde_json::json!(target))
                    .with_data("visited", serde_json::json!(visited.iter().copied().collect::<Vec<_>>()));
                let reply = self.transport.send(msg, true)?;
                Ok(reply.peer.expect("route handler always replies with a peer"))
            }
            None => Ok(at),
        }
    }

    fn resolve_owner(&self, source: PeerId, key: &str) -> Result<PeerId> {
        let id = hash_key(key, self.config.m);
        self.route(source, id)
    }

    // ---- message handling ----

    fn handle_message(&self, id: PeerId, msg: Message) -> Reply {
        match msg.msg_type {
            MsgType::Route => {
                let target = match msg.data.get("target_id").and_then(|v| v.as_u64()) {
                    Some(t) => t,
                    None => return Reply::default(),
                };
                let mut visited: HashSet<PeerId> = msg
                    .data
                    .get("visited")
                    .and_then(|v| serde_json::from_value::<Vec<PeerId>>(v.clone()).ok())
                    .map(|v| v.into_iter().collect())
                    .unwrap_or_default();
                match self.route_inner(id, target, &mut visited) {
                    Ok(peer) => Reply::ok().with_peer(peer),
                    Err(err) => {
                        tracing::warn!(peer = id, %err, "route handler failed");
                        Reply::default()
                    }
                }
            }
            MsgType::JoinRoute => self.handle_join_route(id, msg),
            MsgType::NotifyArrival => {
                if let Ok(rec_arc) = self.peer_arc(id) {
                    let mut rec = rec_arc.lock().unwrap();
                    self.add_to_leaf(&mut rec, msg.src, self.config.m, self.config.leaf_half);
                    self.add_to_routing_table(&mut rec, msg.src, self.config.m, self.config.b);
                }
                Reply::ok()
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
            MsgType::FindSuccessor
            | MsgType::GetPredecessor
            | MsgType::GetSuccessor
            | MsgType::Notify
            | MsgType::TransferKeys => Reply::default(),
        }
    }

    /// One hop of the bootstrap-join route: harvest this peer's routing
    /// table row for the shared-prefix length with the joining node, then
    /// either declare ownership (leaf set brackets the joining id) or
    /// forward towards a closer peer.
    fn handle_join_route(&self, id: PeerId, msg: Message) -> Reply {
        let target = match msg.data.get("target_id").and_then(|v| v.as_u64()) {
            Some(t) => t,
            None => return Reply::default(),
        };
        let mut collected_rows: HashMap<usize, Vec<Option<PeerId>>> = msg
            .data
            .get("collected_rows")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let mut hops_path: Vec<PeerId> = msg
            .data
            .get("hops_path")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let rec_arc = match self.peer_arc(id) {
            Ok(r) => r,
            Err(_) => return Reply::default(),
        };

        let exclude: HashSet<PeerId> = hops_path.iter().copied().collect();
        let (is_owner, row_idx, row_contents, next) = {
            let rec = rec_arc.lock().unwrap();
            let r = shared_prefix_length(id, target, self.config.m, self.config.b) as usize;
            let row_contents = rec.routing_table.get(r).cloned().unwrap_or_default();
            let is_owner = self.owns(&rec, target);
            let next = if is_owner { None } else { self.next_hop(&rec, target, &exclude) };
            (is_owner, r, row_contents, next)
        };

        collected_rows.entry(row_idx).or_insert(row_contents);
        hops_path.push(id);

        if is_owner || next.is_none() {
            let rec = rec_arc.lock().unwrap();
            return Reply::ok()
                .with_peer(id)
                .with_data("leaf_smaller", serde_json::json!(rec.leaf_smaller))
                .with_data("leaf_larger", serde_json::json!(rec.leaf_larger))
                .with_data(
                    "collected_rows",
                    serde_json::to_value(&collected_rows).expect("collected rows always serialize"),
                )
                .with_data("hops_path", serde_json::json!(hops_path));
        }

        let next = next.expect("checked above");
        let forward = Message::new(MsgType::JoinRoute, id, next)
            .with_data("target_id", serde_json::json!(target))
            .with_data(
                "collected_rows",
                serde_json::to_value(&collected_rows).expect("collected rows always serialize"),
            )
            .with_data("hops_path", serde_json::json!(hops_path));
        self.transport.send(forward, true).unwrap_or_default()
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

        for &id in &normalized {
            let rec_arc = self.peer_arc(id)?;
            let mut rec = rec_arc.lock().unwrap();
            for &other in &normalized {
                if other == id {
                    continue;
                }
                self.add_to_leaf(&mut rec, other, self.config.m, self.config.leaf_half);
                self.add_to_routing_table(&mut rec, other, self.config.m, self.config.b);
            }
            rec.state = PeerState::Live;
        }

        let source = normalized[0];
        for (key, value) in bindings {
            self.insert(source, key, value.clone())?;
        }
        Ok(())
    }

    // ---- churn ----

    /// Bootstrap join: `new_id` sends a `join_route` message towards itself
    /// through some existing peer, harvesting one routing-table row from
    /// every hop along the way plus the terminal owner `Z`'s leaf set, then
    /// builds its own leaf set and routing table from that, broadcasts its
    /// arrival, and pulls across whichever of `Z`'s bindings now hash
    /// closer to it than to `Z`.
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
            rec_arc.lock().unwrap().state = PeerState::Live;
            tracing::info!(peer = new_id, "join: first peer in ring");
            return Ok(0);
        }

        let bootstrap = *self
            .peers
            .lock()
            .unwrap()
            .keys()
            .find(|&&id| id != new_id)
            .expect("a peer other than the one just registered exists");
        tracing::debug!(peer = new_id, bootstrap, "join: bootstrapping via join_route");

        let msg = Message::new(MsgType::JoinRoute, new_id, bootstrap)
            .with_data("target_id", serde_json::json!(new_id))
            .with_data("collected_rows", serde_json::json!(HashMap::<String, Vec<Option<PeerId>>>::new()))
            .with_data("hops_path", serde_json::json!(Vec::<PeerId>::new()));
        let reply = self.transport.send(msg, true)?;

        let z = reply.peer.ok_or_else(|| PastryError::NotInitialized(bootstrap))?;
        let z_leaf_smaller: Vec<PeerId> =
            reply.data.get("leaf_smaller").and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();
        let z_leaf_larger: Vec<PeerId> =
            reply.data.get("leaf_larger").and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();
        let collected_rows: HashMap<usize, Vec<Option<PeerId>>> = reply
            .data
            .get("collected_rows")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let hops_path: Vec<PeerId> =
            reply.data.get("hops_path").and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();

        {
            let rec_arc = self.peer_arc(new_id)?;
            let mut rec = rec_arc.lock().unwrap();

            for (row_idx, row) in &collected_rows {
                if *row_idx >= rec.routing_table.len() {
                    continue;
                }
                for (d, entry) in row.iter().enumerate() {
                    if let Some(p) = entry {
                        if *p != new_id && d < rec.routing_table[*row_idx].len() && rec.routing_table[*row_idx][d].is_none() {
                            rec.routing_table[*row_idx][d] = Some(*p);
                        }
                    }
                }
            }

            let mut to_fold: Vec<PeerId> = vec![z];
            to_fold.extend(z_leaf_smaller.iter().copied());
            to_fold.extend(z_leaf_larger.iter().copied());
            to_fold.extend(hops_path.iter().copied());
            for p in to_fold {
                self.add_to_leaf(&mut rec, p, self.config.m, self.config.leaf_half);
                self.add_to_routing_table(&mut rec, p, self.config.m, self.config.b);
            }
            rec.state = PeerState::Live;
        }
        tracing::debug!(peer = new_id, z, "join: leaf set and routing table built from harvested rows");

        let arrival_targets: Vec<PeerId> = {
            let rec_arc = self.peer_arc(new_id)?;
            let rec = rec_arc.lock().unwrap();
            let mut targets: Vec<PeerId> = rec.leaf_smaller.iter().chain(rec.leaf_larger.iter()).copied().collect();
            for row in &rec.routing_table {
                for cell in row {
                    if let Some(p) = cell {
                        targets.push(*p);
                    }
                }
            }
            targets.sort_unstable();
            targets.dedup();
            targets
        };
        for peer in arrival_targets {
            if peer == new_id {
                continue;
            }
            let notify = Message::new(MsgType::NotifyArrival, new_id, peer);
            let _ = self.transport.send(notify, false);
        }

        let items_msg = Message::new(MsgType::GetAllItems, new_id, z);
        if let Ok(reply) = self.transport.send(items_msg, false) {
            if let Some(bindings_json) = reply.data.get("bindings") {
                if let Ok(bindings) = serde_json::from_value::<Vec<TransferredBinding>>(bindings_json.clone()) {
                    for binding in bindings {
                        let key_hash = hash_key(&binding.key, self.config.m);
                        let dist_to_new = circular_distance(new_id, key_hash, self.config.m);
                        let dist_to_z = circular_distance(z, key_hash, self.config.m);
                        let closer_to_new = dist_to_new < dist_to_z || (dist_to_new == dist_to_z && new_id < z);
                        if !closer_to_new {
                            continue;
                        }
                        if let Ok(rec_arc) = self.peer_arc(new_id) {
                            let mut rec = rec_arc.lock().unwrap();
                            for value in binding.values {
                                rec.index.put(&binding.key, value);
                            }
                        }
                        let del_msg = Message::new(MsgType::Delete, new_id, z).with_key(binding.key.clone());
                        let _ = self.transport.send(del_msg, false);
                    }
                }
            }
        }

        Ok(self.transport.stats().total_hops)
    }

    /// Leave: hand each of the departing peer's bindings to whichever
    /// surviving leaf-set neighbor is numerically closest to it, then scrub
    /// the departed id out of every surviving peer's leaf set and routing
    /// table cells.
    pub fn leave(&self, id: PeerId, graceful: bool) -> Result<u64> {
        self.transport.reset_counters();
        let id = self.normalize(id);
        if !self.peers.lock().unwrap().contains_key(&id) {
            tracing::debug!(peer = id, "leave: not present, no-op");
            return Ok(0);
        }
        tracing::info!(peer = id, graceful, "leave: departing ring");

        if graceful {
            let (items, mut leaf_peers) = {
                let rec_arc = self.peer_arc(id)?;
                let rec = rec_arc.lock().unwrap();
                let leaf_peers: Vec<PeerId> = rec.leaf_smaller.iter().chain(rec.leaf_larger.iter()).copied().collect();
                (rec.index.all_items(), leaf_peers)
            };
            leaf_peers.sort_unstable();
            leaf_peers.dedup();

            if !leaf_peers.is_empty() {
                let m = self.config.m;
                for (key, values) in items {
                    let key_hash = hash_key(&key, m);
                    let target_peer = leaf_peers
                        .iter()
                        .copied()
                        .min_by(|&a, &b| {
                            let da = circular_distance(a, key_hash, m);
                            let db = circular_distance(b, key_hash, m);
                            da.cmp(&db).then(a.cmp(&b))
                        })
                        .expect("leaf_peers is non-empty");
                    if let Ok(rec_arc) = self.peer_arc(target_peer) {
                        let mut rec = rec_arc.lock().unwrap();
                        for value in values {
                            rec.index.put(&key, value);
                        }
                    }
                }
            }
        }

        let survivors: Vec<PeerId> = self.peers.lock().unwrap().keys().copied().filter(|&p| p != id).collect();
        for peer in survivors {
            if let Ok(rec_arc) = self.peer_arc(peer) {
                let mut rec = rec_arc.lock().unwrap();
                rec.leaf_smaller.retain(|&p| p != id);
                rec.leaf_larger.retain(|&p| p != id);
                for row in &mut rec.routing_table {
                    for cell in row.iter_mut() {
                        if *cell == Some(id) {
                            *cell = None;
                        }
                    }
                }
            }
        }

        if let Ok(rec_arc) = self.peer_arc(id) {
            rec_arc.lock().unwrap().state = PeerState::Departed;
        }
        self.peers.lock().unwrap().remove(&id);
        self.transport.unregister(id);

        Ok(self.transport.stats().total_hops)
    }
}
