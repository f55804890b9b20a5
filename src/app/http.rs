//! HTTP surface of the user and provider nodes.

use crate::app::error::{NodeError, NodeResult};
use crate::app::provider_node::ProviderNode;
use crate::app::user_node::UserNode;
use crate::domain::messages::{
    AllocationStatus, CalculateMatricesRequest, CalculateMatricesResponse, OptimizeRequest,
    OptimizeResponse, ProviderHealth, ProviderResults, ReceiveMatricesRequest,
    ReceiveMatricesResponse, Step2Preparation, UserHealth, UserResultsReport,
};
use crate::utils::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        }
        (status, Json(self.to_json())).into_response()
    }
}

fn require_body<T>(body: Option<Json<T>>) -> NodeResult<T> {
    body.map(|Json(inner)| inner)
        .ok_or_else(|| NodeError::BadRequest("No data provided".to_string()))
}

pub fn user_router(node: Arc<UserNode>) -> Router {
    Router::new()
        .route("/health", get(user_health))
        .route("/optimize", post(optimize))
        .route("/receive_matrices", post(receive_matrices))
        .route("/get_allocation", get(get_allocation))
        .route("/get_results", get(user_results))
        .with_state(node)
}

async fn user_health(State(node): State<Arc<UserNode>>) -> Json<UserHealth> {
    Json(node.health().await)
}

async fn optimize(
    State(node): State<Arc<UserNode>>,
    body: Option<Json<OptimizeRequest>>,
) -> NodeResult<Json<OptimizeResponse>> {
    let request = body.map(|Json(inner)| inner).unwrap_or_default();
    Ok(Json(node.optimize(request).await?))
}

async fn receive_matrices(
    State(node): State<Arc<UserNode>>,
    body: Option<Json<ReceiveMatricesRequest>>,
) -> NodeResult<Json<ReceiveMatricesResponse>> {
    let request = require_body(body)?;
    Ok(Json(node.receive_matrices(request).await?))
}

async fn get_allocation(State(node): State<Arc<UserNode>>) -> Json<AllocationStatus> {
    Json(node.allocation().await)
}

async fn user_results(State(node): State<Arc<UserNode>>) -> Json<UserResultsReport> {
    Json(node.results().await)
}

pub fn provider_router(node: Arc<ProviderNode>) -> Router {
    Router::new()
        .route("/health", get(provider_health))
        .route("/calculate_matrices", post(calculate_matrices))
        .route("/prepare_step2", post(prepare_step2))
        .route("/get_results", get(provider_results))
        .with_state(node)
}

async fn provider_health(State(node): State<Arc<ProviderNode>>) -> Json<ProviderHealth> {
    Json(node.health().await)
}

async fn calculate_matrices(
    State(node): State<Arc<ProviderNode>>,
    body: Option<Json<CalculateMatricesRequest>>,
) -> NodeResult<Json<CalculateMatricesResponse>> {
    let request = require_body(body)?;
    Ok(Json(node.calculate_matrices(request).await?))
}

async fn prepare_step2(
    State(node): State<Arc<ProviderNode>>,
) -> NodeResult<Json<Step2Preparation>> {
    Ok(Json(node.prepare_step2().await?))
}

async fn provider_results(
    State(node): State<Arc<ProviderNode>>,
) -> NodeResult<Json<ProviderResults>> {
    Ok(Json(node.results().await?))
}

/// Binds `0.0.0.0:<port>` and serves until the process is stopped.
pub async fn serve(router: Router, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("🌐 Listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
