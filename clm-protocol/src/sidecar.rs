//! Loopback HTTP server exposing the [`WorkerClient`](crate::client::WorkerClient)
//! surface to containerized workers that cannot reach the SQLite file
//! directly (spec.md §4.2, §4.3). Bound to `127.0.0.1` only; never exposed
//! outside the host.

use crate::wire::{
    PollRequest, PollResponse, RegisterRequest, RegisterResponse, ReportFailureRequest,
    ReportSuccessRequest,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use clm_store::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Clone)]
struct SidecarState {
    store: Arc<Store>,
}

pub fn build_router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/workers/register", post(register))
        .route("/workers/{worker_id}/poll", post(poll))
        .route("/workers/{worker_id}/heartbeat", post(heartbeat))
        .route("/workers/{worker_id}/deregister", post(deregister))
        .route("/jobs/{job_id}/success", post(report_success))
        .route("/jobs/{job_id}/failure", post(report_failure))
        .with_state(SidecarState { store })
}

/// Binds to a loopback port and serves until the process exits. The engine
/// spawns this alongside any containerized worker pool and tears it down
/// when the pool drains (spec.md §4.4 stop path).
pub async fn serve(store: Arc<Store>, addr: SocketAddr) -> std::io::Result<()> {
    let router = build_router(store);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "worker protocol sidecar listening");
    axum::serve(listener, router).await
}

fn store_error_response(err: clm_store::StoreError) -> Response {
    error!(error = %err, "sidecar store error");
    let status = if err.is_fatal() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::CONFLICT
    };
    (status, err.to_string()).into_response()
}

async fn register(
    State(state): State<SidecarState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    match state
        .store
        .register_worker(req.worker_type, req.execution_mode, &req.executor_id)
        .await
    {
        Ok(worker_id) => Json(RegisterResponse { worker_id }).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn poll(
    State(state): State<SidecarState>,
    Path(worker_id): Path<i64>,
    Json(req): Json<PollRequest>,
) -> Response {
    match state
        .store
        .claim_next(req.job_type, worker_id, req.wait_up_to)
        .await
    {
        Ok(job) => {
            let wire = match job.map(crate::direct::job_to_wire) {
                Some(Ok(w)) => Some(w),
                Some(Err(err)) => {
                    error!(error = %err, "malformed payload in claimed job");
                    return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
                }
                None => None,
            };
            Json(PollResponse { job: wire }).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

async fn heartbeat(State(state): State<SidecarState>, Path(worker_id): Path<i64>) -> Response {
    match state.store.heartbeat(worker_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn deregister(State(state): State<SidecarState>, Path(worker_id): Path<i64>) -> Response {
    match state.store.deregister_worker(worker_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn report_success(
    State(state): State<SidecarState>,
    Path(job_id): Path<i64>,
    Json(req): Json<ReportSuccessRequest>,
) -> Response {
    if let Err(err) = state.store.complete(job_id, req.worker_id).await {
        return store_error_response(err);
    }
    if let Some(cell_outputs) = &req.cell_outputs {
        if let Err(err) =
            crate::direct::cache_put_cell_outputs(&state.store, &req.content_hash, cell_outputs).await
        {
            return store_error_response(err);
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn report_failure(
    State(state): State<SidecarState>,
    Path(job_id): Path<i64>,
    Json(req): Json<ReportFailureRequest>,
) -> Response {
    match state.store.fail(job_id, req.worker_id, &req.error).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_error_response(err),
    }
}
