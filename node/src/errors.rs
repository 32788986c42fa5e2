// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Expired or deleted; clients should drop cached state, not retry.
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("file {0} not found")]
    FileNotFound(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Parse queue or session table is full.
    #[error("server busy: {0}")]
    Busy(String),
    /// The session is above the server-side threshold (or not yet sized) and
    /// must be read window by window.
    #[error("session {0} must be queried in windows")]
    ServerSideOnly(String),
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    fn code(&self) -> &'static str {
        match self {
            ServiceError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            ServiceError::FileNotFound(_) => "FILE_NOT_FOUND",
            ServiceError::InvalidRange(_) => "INVALID_RANGE",
            ServiceError::InvalidFilter(_) => "INVALID_FILTER",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::Busy(_) => "BUSY",
            ServiceError::ServerSideOnly(_) => "SERVER_SIDE_ONLY",
            ServiceError::Storage(_) => "STORAGE_FAILURE",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::SessionNotFound(_) | ServiceError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidRange(_)
            | ServiceError::InvalidFilter(_)
            | ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::ServerSideOnly(_) => StatusCode::CONFLICT,
            ServiceError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Storage(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage and internal detail stays in the logs.
        let message = match &self {
            ServiceError::Storage(e) => {
                tracing::error!(error = %e, "storage failure while serving request");
                "Internal storage failure".to_string()
            }
            ServiceError::Internal(detail) => {
                tracing::error!(%detail, "internal error while serving request");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidFilter(msg) => ServiceError::InvalidFilter(msg),
            other => ServiceError::Storage(other),
        }
    }
}
