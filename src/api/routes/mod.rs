//! API Routes
//!
//! Route handlers organized by functionality.

pub mod commands;
pub mod discovery;
pub mod health;
pub mod ingest;
pub mod nodes;
pub mod register;

use axum::http::{Method, Uri};

use crate::api::error::{ApiError, DeviceError};

/// Fallback for a known endpoint hit with the wrong method (4.05)
pub async fn wrong_method(method: Method, uri: Uri) -> DeviceError {
    tracing::debug!(method = %method, path = %uri.path(), "Wrong method");
    DeviceError(ApiError::WrongMethod)
}

/// Fallback for any path nothing is routed to (4.04)
pub async fn unknown_endpoint(uri: Uri) -> DeviceError {
    DeviceError(ApiError::UnknownEndpoint(uri.path().to_string()))
}

