//! RPC endpoint.
//!
//! # Responsibilities
//! - Build the axum router (`POST /` and `POST /RPC2`)
//! - Wire up middleware (tracing, request timeout, body limit)
//! - Serve over mutually authenticated TLS until shutdown

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use serde_json::Value;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::agent::LoadBalancerAgent;
use crate::lifecycle::ShutdownSignal;
use crate::rpc::handlers::{dispatch, METHODS};
use crate::rpc::protocol::{RpcError, RpcRequest, RpcResponse};

/// Largest accepted request body; a full config fits comfortably.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Time given to in-flight calls once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(agent: Arc<LoadBalancerAgent>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/RPC2", post(rpc_handler))
        .with_state(agent)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

async fn rpc_handler(State(agent): State<Arc<LoadBalancerAgent>>, body: Bytes) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed RPC request");
            return Json(RpcResponse::failure(Value::Null, RpcError::parse_error(e)));
        }
    };
    Json(dispatch(agent, request).await)
}

/// Serve RPC calls on `addr` until `shutdown` fires.
pub async fn serve(
    agent: Arc<LoadBalancerAgent>,
    addr: SocketAddr,
    tls: RustlsConfig,
    request_timeout: Duration,
    mut shutdown: ShutdownSignal,
) -> io::Result<()> {
    for (public_name, _) in METHODS {
        tracing::info!(public_name, "Registering RPC method");
    }

    let handle = Handle::new();
    let drain = handle.clone();
    tokio::spawn(async move {
        shutdown.wait().await;
        tracing::info!(grace = ?DRAIN_TIMEOUT, "Draining RPC endpoint");
        drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    tracing::info!(address = %addr, "RPC endpoint listening");
    let app = build_router(agent, request_timeout);
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    tracing::info!("RPC endpoint stopped");
    Ok(())
}
