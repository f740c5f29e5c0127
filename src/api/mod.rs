pub mod ws;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::catalog::{AVAILABLE_MODELS, AVAILABLE_TOOLS};
use crate::crew::{AgentDefinition, TaskDefinition};
use crate::error::{CrewError, Result};
use crate::service::CrewService;
use crate::session::SessionId;

const DEFAULT_TOPIC: &str = "Artificial Intelligence";

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = std::result::Result<T, ApiError>;

/// Map service errors onto HTTP status codes with a JSON detail body
fn error_response(err: Box<dyn std::error::Error + Send + Sync>) -> ApiError {
    let status = match err.downcast_ref::<CrewError>() {
        Some(CrewError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
        Some(
            CrewError::Configuration(_)
            | CrewError::UnknownAgent(_)
            | CrewError::Precondition(_)
            | CrewError::Parse(_),
        ) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "detail": err.to_string() })))
}

pub fn create_router(service: Arc<CrewService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/models", get(list_models))
        .route("/api/tools", get(list_tools))
        .route("/api/settings/validate-key", post(validate_key))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/agents", post(set_agents))
        .route("/api/sessions/:id/model", post(set_model))
        .route("/api/sessions/:id/tasks", post(set_tasks))
        .route("/api/sessions/:id/api-key", post(set_api_key))
        .route("/api/sessions/:id/start", post(start_run))
        .route("/api/sessions/:id/result", get(get_result))
        .route("/api/sessions/:id/stats", get(get_stats))
        .route("/ws/:id", get(ws::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

/// Bind and serve the API until the process exits
pub async fn serve(service: Arc<CrewService>) -> Result<()> {
    let addr = format!(
        "{}:{}",
        service.config().server.host,
        service.config().server.port
    );
    let app = create_router(service);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CrewError::Network(format!("Failed to bind {}: {}", addr, e)))?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .await
        .map_err(|e| CrewError::Network(format!("Server error: {}", e)))?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Crew Studio API", "version": env!("CARGO_PKG_VERSION") }))
}

async fn list_models() -> Json<Value> {
    Json(json!({ "models": AVAILABLE_MODELS }))
}

async fn list_tools() -> Json<Value> {
    Json(json!({ "tools": AVAILABLE_TOOLS }))
}

#[derive(Debug, Deserialize)]
struct ApiKeyRequest {
    api_key: String,
}

async fn validate_key(
    State(service): State<Arc<CrewService>>,
    Json(payload): Json<ApiKeyRequest>,
) -> Json<Value> {
    let (valid, message) = service.validate_api_key(&payload.api_key).await;
    Json(json!({ "valid": valid, "message": message }))
}

async fn create_session(State(service): State<Arc<CrewService>>) -> Json<Value> {
    let session_id = service.create_session().await;
    Json(json!({ "session_id": session_id }))
}

async fn get_session(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    let snapshot = service.session_snapshot(id).await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
}

async fn set_agents(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
    Json(agents): Json<Vec<AgentDefinition>>,
) -> ApiResult<Json<Value>> {
    let count = service
        .set_agents(id, agents)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "status": "success", "agents_count": count })))
}

#[derive(Debug, Deserialize)]
struct ModelRequest {
    model_id: Option<String>,
}

async fn set_model(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
    Json(payload): Json<ModelRequest>,
) -> ApiResult<Json<Value>> {
    let model = service
        .set_model(id, payload.model_id.unwrap_or_default())
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "status": "success", "model": model })))
}

async fn set_tasks(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
    Json(tasks): Json<Vec<TaskDefinition>>,
) -> ApiResult<Json<Value>> {
    let count = service
        .set_tasks(id, tasks)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "status": "success", "tasks_count": count })))
}

async fn set_api_key(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
    Json(payload): Json<ApiKeyRequest>,
) -> ApiResult<Json<Value>> {
    service
        .set_api_key(id, payload.api_key)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    topic: Option<String>,
}

async fn start_run(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
    Json(payload): Json<StartRequest>,
) -> ApiResult<Json<Value>> {
    let topic = payload
        .topic
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    service.start_run(id, topic).await.map_err(error_response)?;
    Ok(Json(json!({ "status": "started", "session_id": id })))
}

async fn get_result(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    let result = service.session_result(id).await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

async fn get_stats(
    State(service): State<Arc<CrewService>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    let stats = service.session_stats(id).await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status_mapping() {
        let (status, _) = error_response(Box::new(CrewError::SessionNotFound("abc".to_string())));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(Box::new(CrewError::UnknownAgent("Ghost".to_string())));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = error_response(Box::new(CrewError::Execution("boom".to_string())));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.0["detail"].as_str().unwrap().contains("boom"));
    }
}
