use crate::error::Result;
use crate::message::{Message, PeerId, Reply, Stats};

/// A peer's local callback: given an inbound [`Message`], produce a
/// [`Reply`]. Owned by whichever transport registered it and invoked after
/// the transport has released its own locks, so a handler is free to
/// forward - and so re-enter `send` - without deadlocking its caller.
pub type Handler = Box<dyn Fn(Message) -> Reply + Send + Sync>;

/// What a registered peer id resolves to, from a transport's point of view.
///
/// [`InMemoryTransport`](crate::InMemoryTransport) only ever deals in
/// `Local` handlers - it has no way to dial an address. `HttpTransport`
/// accepts both: a `Local` handler is invoked directly, skipping the
/// network round trip, which is how a peer can address itself without
/// going out over HTTP; a `Remote` address is where everyone else lives.
pub enum Endpoint {
    Local(Handler),
    Remote(String),
}

impl Endpoint {
    pub fn local(handler: Handler) -> Self {
        Endpoint::Local(handler)
    }

    pub fn remote(address: impl Into<String>) -> Self {
        Endpoint::Remote(address.into())
    }
}

/// The request/reply bus every protocol crate routes through. Both
/// implementations share this contract so a Chord or Pastry peer never has
/// to know which one it's plugged into.
pub trait Transport: Send + Sync {
    /// Make `id` reachable through this transport.
    fn register(&self, id: PeerId, endpoint: Endpoint);

    /// Remove `id`; subsequent sends to it fail with `UnknownPeer`.
    fn unregister(&self, id: PeerId);

    /// Deliver `msg` to `msg.dst` and return its handler's reply.
    ///
    /// `count_hop` must be `true` for a forwarded routing message and
    /// `false` for a terminal store-op or a maintenance message - the
    /// measured cost of an operation is exactly the number of `true` sends
    /// it triggers.
    fn send(&self, msg: Message, count_hop: bool) -> Result<Reply>;

    /// Zero both counters. Client entry points call this on entry so a
    /// single operation's hop count never leaks into the next.
    fn reset_counters(&self);

    /// Snapshot of `(total_hops, message_count)` since the last reset.
    fn stats(&self) -> Stats;
}
