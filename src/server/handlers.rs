// HTTP handlers for the build API

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::artifacts::VersionMeta;
use crate::build::{BuildService, ServiceError};
use crate::session::{BuildSession, SessionError};

#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, alias = "projectId")]
    pub project_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IterateRequest {
    #[serde(default, alias = "changeRequest")]
    pub change_request: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub project_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StopPreviewResponse {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionMeta>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A status code plus a JSON `{error}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::InvalidTransition { .. }
            | SessionError::AlreadyActive(_)
            | SessionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Session(e) => e.into(),
            ServiceError::Forge(e) => {
                tracing::error!(kind = e.kind(), "Request failed: {}", e);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Malformed bodies keep axum's status (400/415/422, 413 over the body limit)
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the API router around a build service
pub fn create_router(service: BuildService) -> Router {
    Router::new()
        .route("/api/create", post(create_build))
        .route("/api/status/:id", get(get_status))
        .route("/api/iterate/:id", post(iterate_build))
        .route("/api/stop-preview/:id", post(stop_preview))
        .route("/api/versions/:id", get(list_versions))
        .route("/health", get(health_check))
        .with_state(service)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_build(
    State(service): State<BuildService>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<AcceptedResponse> {
    let Json(request) = body?;
    let prompt = request.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt is required"));
    }

    let session = service.start_build(&prompt, request.project_id)?;
    Ok(Json(AcceptedResponse {
        project_id: session.id,
        status: "started",
    }))
}

async fn get_status(
    State(service): State<BuildService>,
    Path(id): Path<String>,
) -> ApiResult<BuildSession> {
    Ok(Json(service.get_status(&id)?))
}

async fn iterate_build(
    State(service): State<BuildService>,
    Path(id): Path<String>,
    body: Result<Json<IterateRequest>, JsonRejection>,
) -> ApiResult<AcceptedResponse> {
    let Json(request) = body?;
    let change = request.change_request.unwrap_or_default();
    let session = service.start_iteration(&id, &change)?;
    Ok(Json(AcceptedResponse {
        project_id: session.id,
        status: session.status.as_str(),
    }))
}

async fn stop_preview(
    State(service): State<BuildService>,
    Path(id): Path<String>,
) -> ApiResult<StopPreviewResponse> {
    let stopped = service.stop_preview(&id).await?;
    Ok(Json(StopPreviewResponse {
        stopped,
        message: (!stopped).then(|| "No local preview running".to_string()),
    }))
}

async fn list_versions(
    State(service): State<BuildService>,
    Path(id): Path<String>,
) -> ApiResult<VersionsResponse> {
    let versions = service.list_versions(&id).await?;
    Ok(Json(VersionsResponse { versions }))
}
