use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jacques_types::ErrorKind;
use serde_json::json;

/// Handler error that renders as `{error, detail?}` JSON.
pub struct AppError {
    status: StatusCode,
    error: String,
    detail: Option<String>,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "not found".into(),
            detail: Some(msg.into()),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "bad request".into(),
            detail: Some(msg.into()),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            error: "conflict".into(),
            detail: Some(msg.into()),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "internal error".into(),
            detail: Some(msg.into()),
        }
    }

    fn from_kind(kind: ErrorKind, detail: String) -> Self {
        match kind {
            ErrorKind::NotFound => Self::not_found(detail),
            ErrorKind::Parse => Self::bad_request(detail),
            ErrorKind::Conflict => Self::conflict(detail),
            ErrorKind::Cancelled => Self {
                status: StatusCode::CONFLICT,
                error: "cancelled".into(),
                detail: Some(detail),
            },
            ErrorKind::Io | ErrorKind::Invariant => Self::internal(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });
        if let Some(detail) = self.detail {
            body["detail"] = json!(detail);
        }
        (self.status, axum::Json(body)).into_response()
    }
}

impl From<jacques_types::Error> for AppError {
    fn from(err: jacques_types::Error) -> Self {
        tracing::error!("core error: {err}");
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<jacques_runtime::Error> for AppError {
    fn from(err: jacques_runtime::Error) -> Self {
        tracing::error!("runtime error: {err}");
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {err}"))
    }
}
