use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::message::{Message, Reply};
use crate::transport::Handler;

/// The receiving half of the HTTP transport: a bare `POST /message` that
/// decodes the envelope, runs it through a single handler, and replies with
/// whatever that handler returns.
///
/// This is deliberately narrow - it is the minimal surface the `Transport`
/// contract needs for an `HttpTransport` peer to be dialable, not the full
/// node server (discovery, `/init`, per-operation REST endpoints) that an
/// external orchestrator would run on top of it.
pub struct MessageServer {
    handler: Arc<Handler>,
}

impl MessageServer {
    pub fn new(handler: Handler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/message", post(dispatch))
            .with_state(self.handler.clone())
    }

    /// Bind `addr` and serve forever, blocking the calling thread.
    ///
    /// Runs its own single-thread `tokio` runtime rather than requiring the
    /// caller to already be inside one - a peer that only ever uses the
    /// in-memory transport never pays for an async runtime at all.
    pub fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve(addr))
    }

    async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await
    }
}

async fn dispatch(State(handler): State<Arc<Handler>>, Json(msg): Json<Message>) -> Json<Reply> {
    Json(handler(msg))
}
