//! HTTP listener hosting the HTTP → serial gateway.
//!
//! One route:
//!
//! | Method | Path         | Body      | Responses                          |
//! |--------|--------------|-----------|------------------------------------|
//! | POST   | `/to-serial` | raw bytes | 200 `ok`, 400 `empty body`,        |
//! |        |              |           | 503 `serial not connected`,        |
//! |        |              |           | 500 `failed to write to serial`    |
//!
//! Each request runs as its own task inside `axum::serve`; the gateway's
//! device write lock is what keeps concurrent bodies apart on the wire.
//!
//! Shutdown drains in-flight requests for at most the grace period.  After
//! that, handlers still waiting on the device are cancelled (answering 503
//! and releasing the write lock) and the server task is aborted.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{GatewayOutcome, HttpToSerialGateway};
use crate::domain::BridgeError;

#[derive(Clone)]
struct ServerState {
    gateway: Arc<HttpToSerialGateway>,
    /// Turns `true` when in-flight requests must give up.
    abandon: watch::Receiver<bool>,
}

/// Builds the router.  Exposed so tests can drive it without a socket.
///
/// Requests in flight when `abandon` turns `true` stop waiting on the device
/// and answer 503.
pub fn router(gateway: Arc<HttpToSerialGateway>, abandon: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/to-serial", post(to_serial))
        .with_state(ServerState { gateway, abandon })
}

async fn to_serial(State(state): State<ServerState>, body: Bytes) -> GatewayOutcome {
    tokio::select! {
        outcome = state.gateway.handle(&body) => outcome,
        () = abandoned(state.abandon) => {
            warn!("abandoning POST /to-serial of {} bytes at shutdown", body.len());
            GatewayOutcome::NotConnected
        }
    }
}

/// Resolves once the flag is `true`.  Never resolves if the sender is gone
/// without setting it.
async fn abandoned(mut abandon: watch::Receiver<bool>) {
    let closed = abandon.wait_for(|flag| *flag).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

impl IntoResponse for GatewayOutcome {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.message()).into_response()
    }
}

// ── Server lifecycle ──────────────────────────────────────────────────────────

/// A running listener.  Dropping the handle does not stop the server; call
/// [`HttpServerHandle::shutdown`].
pub struct HttpServerHandle {
    local_addr: SocketAddr,
    grace: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    abandon_tx: watch::Sender<bool>,
    task: Option<JoinHandle<io::Result<()>>>,
}

/// Binds `bind_addr` and serves the gateway on a background task.
///
/// Port `0` picks a free port; the chosen address is available from
/// [`HttpServerHandle::local_addr`].  `grace` bounds how long
/// [`HttpServerHandle::shutdown`] waits for in-flight requests.
///
/// # Errors
///
/// Returns [`BridgeError::Bind`] if the address is in use or not permitted.
pub async fn spawn_http_server(
    bind_addr: SocketAddr,
    gateway: Arc<HttpToSerialGateway>,
    grace: Duration,
) -> Result<HttpServerHandle, BridgeError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: bind_addr,
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| BridgeError::Bind {
            addr: bind_addr,
            source,
        })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (abandon_tx, abandon_rx) = watch::channel(false);
    let app = router(gateway, abandon_rx);

    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                // Either an explicit signal or the handle being dropped.
                let _ = shutdown_rx.await;
            })
            .await
    });

    info!("HTTP server listening on http://{local_addr}");

    Ok(HttpServerHandle {
        local_addr,
        grace,
        shutdown_tx: Some(shutdown_tx),
        abandon_tx,
        task: Some(task),
    })
}

impl HttpServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits up to the grace period for
    /// in-flight requests.  Requests still running after that are cancelled
    /// and the server task is aborted.  Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let Some(mut task) = self.task.take() else {
            return;
        };

        let joined = match tokio::time::timeout(self.grace, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "HTTP server on {} still busy after {:?}; abandoning in-flight requests",
                    self.local_addr, self.grace
                );
                self.abandon_tx.send_replace(true);
                task.abort();
                task.await
            }
        };

        match joined {
            Ok(Ok(())) => info!("HTTP server on {} stopped", self.local_addr),
            Ok(Err(e)) => warn!("HTTP server on {} stopped with error: {e}", self.local_addr),
            Err(e) if e.is_cancelled() => info!("HTTP server on {} aborted", self.local_addr),
            Err(e) => error!("HTTP server task failed: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
