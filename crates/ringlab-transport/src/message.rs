use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A peer identifier, as an offset into the `2^m` ring.
pub type PeerId = u64;

/// The recognized message kinds. A single `match` on this, in each protocol
/// crate's handler, replaces what the thing this lab compares against would
/// have done with a string `msg_type` and an `if`/`elif` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    FindSuccessor,
    GetPredecessor,
    GetSuccessor,
    Notify,
    TransferKeys,
    Route,
    JoinRoute,
    NotifyArrival,
    Lookup,
    Insert,
    Delete,
    Update,
    GetAllItems,
}

/// A value carried across the wire. Routing code never inspects these; only
/// the HTTP transport (and the caller, on either end) cares what's inside.
/// The `_type`/`data` tagging lets a receiver reconstruct the same shape a
/// sender held, rather than collapsing everything to a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", content = "data", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

/// A request flowing through the transport. `data` carries whatever
/// protocol-specific fields the message type needs - `target_id`, `start`,
/// `end`, `new_node_id`, `visited`, `collected_rows`, `hops_path`, and so on
/// - rather than giving every field its own slot on every message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MsgType,
    pub src: PeerId,
    pub dst: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(msg_type: MsgType, src: PeerId, dst: PeerId) -> Self {
        Self {
            msg_type,
            src,
            dst,
            key: None,
            value: None,
            data: HashMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_data(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(field.into(), value);
        self
    }
}

/// A handler's answer. One shape serves every message type: a routing reply
/// fills `peer`, a store-op reply fills `values`, a Pastry join-route reply
/// fills `data` with the harvested rows and hop path, and so on - whichever
/// fields a given `msg_type` doesn't use are simply left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, peer: PeerId) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_data(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(field.into(), value);
        self
    }
}

/// Running totals a transport keeps across a client operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_hops: u64,
    pub message_count: u64,
}
