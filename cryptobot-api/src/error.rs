use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cryptobot_core::DashboardError;
use serde_json::json;

/// Error returned by every handler; rendered as `{ "message": ... }`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Dashboard(DashboardError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        ApiError::Dashboard(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Dashboard(err) => match err {
                DashboardError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
                DashboardError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                DashboardError::Conflict(msg) => (StatusCode::CONFLICT, msg),
                other => {
                    tracing::error!("request failed: {other:?}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
