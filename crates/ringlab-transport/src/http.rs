use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::message::{Message, PeerId, Reply, Stats};
use crate::transport::{Endpoint, Handler, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

enum StoredEndpoint {
    Local(Arc<Handler>),
    Remote(String),
}

struct Inner {
    endpoints: HashMap<PeerId, StoredEndpoint>,
    total_hops: u64,
    message_count: u64,
}

/// A transport that reaches remote peers over HTTP, and local ones by
/// calling their handler directly.
///
/// `send` uses `reqwest`'s blocking client rather than an async one, so the
/// trait stays synchronous for every caller regardless of which transport
/// they're plugged into - introducing a workspace-wide async runtime just
/// for this one implementation would leak into every protocol crate that
/// only cares about the trait, not how a particular transport is wired up.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    inner: Mutex<Inner>,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            client,
            inner: Mutex::new(Inner {
                endpoints: HashMap::new(),
                total_hops: 0,
                message_count: 0,
            }),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for HttpTransport {
    fn register(&self, id: PeerId, endpoint: Endpoint) {
        let stored = match endpoint {
            Endpoint::Local(handler) => StoredEndpoint::Local(Arc::new(handler)),
            Endpoint::Remote(address) => StoredEndpoint::Remote(address),
        };
        self.inner.lock().unwrap().endpoints.insert(id, stored);
    }

    fn unregister(&self, id: PeerId) {
        self.inner.lock().unwrap().endpoints.remove(&id);
    }

    fn send(&self, msg: Message, count_hop: bool) -> Result<Reply> {
        let dst = msg.dst;

        enum Dispatch {
            Local(Arc<Handler>),
            Remote(String),
        }

        let dispatch = {
            let mut inner = self.inner.lock().unwrap();
            inner.message_count += 1;
            if count_hop {
                inner.total_hops += 1;
            }
            match inner.endpoints.get(&dst) {
                Some(StoredEndpoint::Local(handler)) => Dispatch::Local(handler.clone()),
                Some(StoredEndpoint::Remote(address)) => Dispatch::Remote(address.clone()),
                None => return Err(TransportError::UnknownPeer(dst)),
            }
        };

        tracing::trace!(src = msg.src, dst, ?msg.msg_type, hop = count_hop, "dispatching message");

        match dispatch {
            Dispatch::Local(handler) => Ok(handler(msg)),
            Dispatch::Remote(address) => {
                let url = format!("http://{address}/message");
                let response = self
                    .client
                    .post(&url)
                    .json(&msg)
                    .send()
                    .and_then(|response| response.error_for_status())
                    .map_err(|source| TransportError::Http { peer: dst, source })?;
                response
                    .json::<Reply>()
                    .map_err(|_| TransportError::MalformedReply(dst))
            }
        }
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
