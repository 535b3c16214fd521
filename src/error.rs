use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid route table: {0}")]
    RouteTable(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unknown endpoint: {method} {path}")]
    UnknownEndpoint { method: String, path: String },

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
            ServiceError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::Http(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Json(_)
            | ServiceError::Io(_)
            | ServiceError::Config(_)
            | ServiceError::Storage(_)
            | ServiceError::RouteTable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Uniform `{error: message}` body used by every failure response.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
