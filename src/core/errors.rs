use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("embedding provider error: {0}")]
    Embedding(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl KnowledgeError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        KnowledgeError::Internal(err.to_string())
    }
}

impl IntoResponse for KnowledgeError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            KnowledgeError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            KnowledgeError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            KnowledgeError::Embedding(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            KnowledgeError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
