use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Result, TransportError};
use crate::message::{Message, PeerId, Reply, Stats};
use crate::transport::{Endpoint, Handler, Transport};

struct Inner {
    handlers: HashMap<PeerId, Arc<Handler>>,
    total_hops: u64,
    message_count: u64,
}

/// A single-process transport: peers are just entries in a map, and
/// `send` calls the target's handler directly on the caller's thread.
///
/// Registry and counters share one mutex, but the handler itself runs
/// *outside* the lock - `send` looks the handler up, drops the guard, and
/// only then calls it. A handler that forwards (re-entering `send` for a
/// different peer) would otherwise deadlock against its own lookup.
pub struct InMemoryTransport {
    inner: Mutex<Inner>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                handlers: HashMap::new(),
                total_hops: 0,
                message_count: 0,
            }),
        }
    }
}

impl Transport for InMemoryTransport {
    fn register(&self, id: PeerId, endpoint: Endpoint) {
        let handler = match endpoint {
            Endpoint::Local(handler) => handler,
            Endpoint::Remote(address) => {
                tracing::warn!(peer = id, address, "in-memory transport ignores remote endpoints");
                return;
            }
        };
        self.inner.lock().unwrap().handlers.insert(id, Arc::new(handler));
    }

    fn unregister(&self, id: PeerId) {
        self.inner.lock().unwrap().handlers.remove(&id);
    }

    fn send(&self, msg: Message, count_hop: bool) -> Result<Reply> {
        let handler = {
            let mut inner = self.inner.lock().unwrap();
            inner.message_count += 1;
            if count_hop {
                inner.total_hops += 1;
            }
            inner.handlers.get(&msg.dst).cloned()
        };
        let handler = handler.ok_or(TransportError::UnknownPeer(msg.dst))?;

        tracing::trace!(
            src = msg.src,
            dst = msg.dst,
            ?msg.msg_type,
            hop = count_hop,
            "dispatching message"
        );
        Ok(handler(msg))
    }

    fn reset_counters(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_hops = 0;
        inner.message_count = 0;
    }

    fn stats(&self) -> Stats {
        let inner = self.inner.lock().unwrap();
        Stats {
            total_hops: inner.total_hops,
            message_count: inner.message_count,
        }
    }
}
