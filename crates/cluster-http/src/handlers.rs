//! Route handlers. Each one validates its path/body shape and calls
//! straight into the [`cluster_controller::ClusterManager`]; none of them
//! carry lifecycle logic of their own (§4.7).

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cluster_pipeline::{PipelineConfig, WebEdge, WebPipeline, WrappedNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::server::ServerState;

#[derive(Debug, Deserialize)]
pub struct CreatePipelineRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<PipelineConfig>,
}

pub async fn create_pipeline(
    State(state): State<ServerState>,
    Json(request): Json<CreatePipelineRequest>,
) -> Result<Json<WebPipeline>, ApiError> {
    let pipeline = match request.config {
        Some(config) => state.manager.create_pipeline_from_config(&config).await?,
        None => {
            state
                .manager
                .create_pipeline(
                    request.name.unwrap_or_default(),
                    request.description.unwrap_or_default(),
                )
                .await
        }
    };
    Ok(Json(pipeline))
}

pub async fn list_pipelines(State(state): State<ServerState>) -> Json<Vec<WebPipeline>> {
    Json(state.manager.list_pipelines().await)
}

pub async fn get_pipeline(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
) -> Result<Json<WebPipeline>, ApiError> {
    Ok(Json(state.manager.get_pipeline(&pipeline_id).await?))
}

pub async fn remove_pipeline(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
) -> Result<Json<WebPipeline>, ApiError> {
    Ok(Json(state.manager.remove_pipeline(&pipeline_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddNodeRequest {
    pub registry_name: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

pub async fn add_node(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
    Json(request): Json<AddNodeRequest>,
) -> Result<Json<WrappedNode>, ApiError> {
    let node = state
        .manager
        .add_node(
            &pipeline_id,
            &request.registry_name,
            request.package.as_deref(),
            request.params,
        )
        .await?;
    Ok(Json(node))
}

pub async fn remove_node(
    State(state): State<ServerState>,
    Path((pipeline_id, node_id)): Path<(String, String)>,
) -> Result<Json<WrappedNode>, ApiError> {
    Ok(Json(state.manager.remove_node(&pipeline_id, &node_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EdgeRequest {
    pub source: String,
    pub sink: String,
    #[serde(default)]
    pub edge_id: Option<String>,
}

pub async fn add_edge(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
    Json(request): Json<EdgeRequest>,
) -> Result<Json<WebEdge>, ApiError> {
    let edge = state
        .manager
        .add_edge(&pipeline_id, &request.source, &request.sink, request.edge_id)
        .await?;
    Ok(Json(edge))
}

pub async fn remove_edge(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
    Json(request): Json<EdgeRequest>,
) -> Result<Json<WebEdge>, ApiError> {
    let edge = state
        .manager
        .remove_edge(
            &pipeline_id,
            &request.source,
            &request.sink,
            request.edge_id.as_deref(),
        )
        .await?;
    Ok(Json(edge))
}

pub async fn assign_workers(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
    Json(assignments): Json<HashMap<String, String>>,
) -> Result<StatusCode, ApiError> {
    state.manager.assign_workers(&pipeline_id, assignments).await?;
    Ok(StatusCode::OK)
}

macro_rules! lifecycle_handler {
    ($name:ident, $method:ident) => {
        pub async fn $name(
            State(state): State<ServerState>,
            Path(_pipeline_id): Path<String>,
        ) -> Result<StatusCode, ApiError> {
            state.manager.$method().await?;
            Ok(StatusCode::OK)
        }
    };
}

pub async fn instantiate(
    State(state): State<ServerState>,
    Path(pipeline_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.manager.instantiate(&pipeline_id).await?;
    Ok(StatusCode::OK)
}

lifecycle_handler!(commit, commit);
lifecycle_handler!(preview, preview);
lifecycle_handler!(record, record);
lifecycle_handler!(stop, stop);
lifecycle_handler!(collect, collect);
lifecycle_handler!(reset, reset);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub fsm: cluster_fsm::FsmSnapshot,
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let info = state.manager.get_states_info().await;
    Json(HealthResponse { fsm: info.fsm })
}
