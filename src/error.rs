// error.rs
use crate::models::Brand;
use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Device already exists: {0}")]
    DeviceExists(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unsupported brand: {0}")]
    UnsupportedBrand(Brand),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DeviceNotFound => StatusCode::NOT_FOUND,
            AppError::DeviceExists(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedBrand(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Protocol(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Failures of a single vendor round-trip.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("device returned error code {code}: {message}")]
    Vendor { code: i64, message: String },
    #[error("{0} protocol is not implemented")]
    NotImplemented(&'static str),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Parse(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
