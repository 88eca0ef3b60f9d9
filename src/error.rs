/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("请求失败,DeepSeek API返回: {message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    ServerError,
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::Config(_)
            | RelayError::Upstream { .. }
            | RelayError::Transport(_)
            | RelayError::Internal(_) => ErrorCategory::ServerError,
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Format an error as (`status_code`, JSON body).
///
/// All pre-stream failures share the `{"error": "<message>"}` body shape the
/// client expects; mid-stream failures never reach this path (they degrade to
/// a terminal `error` event on the already-committed stream).
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let status = http_status_for_category(err.category());
    let body = serde_json::json!({ "error": err.to_string() });
    (status, body)
}

/// Convert a `RelayError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &RelayError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}
