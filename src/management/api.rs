//! Admin HTTP API.
//!
//! Routes are relative; the host nests them under its admin prefix.

use crate::core::{ConfigMap, Error, Result};
use crate::management::manager::PluginManager;
use crate::store::PluginRecord;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Default mount point for the admin routes.
pub const DEFAULT_ADMIN_PREFIX: &str = "/api/v1/admin/plugins";

/// `Retry-After` seconds sent with retryable errors.
pub const RETRY_AFTER_SECS: u64 = 5;

/// Uniform response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Human-readable message
    pub message: String,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Successful response with a payload.
    pub fn success(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data: Some(data),
        }
    }

    /// Failed response.
    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            data: None,
        }
    }
}

/// HTTP status for an error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::BindingConflict { .. } | Error::InvalidRoute(_) => StatusCode::CONFLICT,
        Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Admin request failed");
        }
        let body = Json(ApiResponse::<()>::error(&self.to_string()));
        if self.is_retryable() {
            let retry_after = [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())];
            return (status, retry_after, body).into_response();
        }
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

/// Build the admin router.
pub fn admin_router(manager: PluginManager) -> Router {
    Router::new()
        .route("/", get(list_plugins))
        .route("/refresh", post(refresh_plugins))
        .route("/:id", get(get_plugin).delete(remove_plugin))
        .route("/:id/enable", post(enable_plugin))
        .route("/:id/disable", post(disable_plugin))
        .route("/:id/config", put(update_config))
        .with_state(manager)
}

async fn list_plugins(State(manager): State<PluginManager>) -> ApiResult<Vec<PluginRecord>> {
    let records = manager.list_plugins().await?;
    Ok(Json(ApiResponse::success("Plugins retrieved", records)))
}

async fn get_plugin(
    State(manager): State<PluginManager>,
    Path(id): Path<String>,
) -> ApiResult<PluginRecord> {
    let record = manager.get_plugin(&id).await?;
    Ok(Json(ApiResponse::success("Plugin retrieved", record)))
}

async fn enable_plugin(
    State(manager): State<PluginManager>,
    Path(id): Path<String>,
) -> ApiResult<PluginRecord> {
    let record = manager.enable_plugin(&id).await?;
    Ok(Json(ApiResponse::success("Plugin enabled", record)))
}

async fn disable_plugin(
    State(manager): State<PluginManager>,
    Path(id): Path<String>,
) -> ApiResult<PluginRecord> {
    let record = manager.disable_plugin(&id).await?;
    Ok(Json(ApiResponse::success("Plugin disabled", record)))
}

async fn refresh_plugins(State(manager): State<PluginManager>) -> ApiResult<Vec<PluginRecord>> {
    let records = manager.refresh_plugins().await?;
    Ok(Json(ApiResponse::success("Plugins refreshed", records)))
}

async fn update_config(
    State(manager): State<PluginManager>,
    Path(id): Path<String>,
    Json(config): Json<ConfigMap>,
) -> ApiResult<PluginRecord> {
    let record = manager.update_plugin_config(&id, config).await?;
    Ok(Json(ApiResponse::success("Plugin configuration updated", record)))
}

async fn remove_plugin(
    State(manager): State<PluginManager>,
    Path(id): Path<String>,
) -> ApiResult<Option<PluginRecord>> {
    let record = manager.remove_plugin(&id).await?;
    Ok(Json(ApiResponse::success("Plugin removed", record)))
}
