//! HTTP mapping of [`FolioError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use folio_core::error::FolioError;

use crate::obs::MetricsError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error returned by handlers and middleware.
#[derive(Debug)]
pub struct ApiError(pub FolioError);

impl From<FolioError> for ApiError {
    fn from(e: FolioError) -> Self {
        Self(e)
    }
}

impl From<MetricsError> for ApiError {
    fn from(e: MetricsError) -> Self {
        Self(FolioError::Internal(e.to_string()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            FolioError::BadRequest(_) => StatusCode::BAD_REQUEST,
            FolioError::NotFound(_) => StatusCode::NOT_FOUND,
            FolioError::NotAllowed(_) => StatusCode::FORBIDDEN,
            FolioError::Config(_) | FolioError::Bind { .. } | FolioError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(json!({
            "error": self.0.client_code().as_str(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
