//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.
//!
//! Errors on the device-facing endpoints (`/senml`, `/reg`) carry no body,
//! mirroring the node protocol's 4.0x codes. Errors on `/api/v1` carry a
//! JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::relay::RelayError;
use crate::telemetry::RegistryError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Device payload could not be decoded (4.06)
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Known endpoint, unsupported method (4.05)
    #[error("Method not allowed")]
    WrongMethod,

    /// No such endpoint (4.04)
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Registry rejected the request
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Command could not be relayed
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Status code and error code for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MalformedPayload(_) => (StatusCode::NOT_ACCEPTABLE, "MALFORMED_PAYLOAD"),
            ApiError::WrongMethod => (StatusCode::METHOD_NOT_ALLOWED, "WRONG_METHOD"),
            ApiError::UnknownEndpoint(_) => (StatusCode::NOT_FOUND, "UNKNOWN_ENDPOINT"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Registry(RegistryError::UnknownNode(_)) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_NODE")
            }
            ApiError::Registry(RegistryError::ShapeMismatch { .. }) => {
                (StatusCode::NOT_ACCEPTABLE, "SHAPE_MISMATCH")
            }
            ApiError::Registry(RegistryError::MalformedPayload(_)) => {
                (StatusCode::NOT_ACCEPTABLE, "MALFORMED_PAYLOAD")
            }
            ApiError::Relay(RelayError::UnknownNode(_)) => (StatusCode::NOT_FOUND, "UNKNOWN_NODE"),
            ApiError::Relay(RelayError::InvalidCommand(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_COMMAND")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }

    /// Response for a device endpoint: status only, empty body
    pub fn into_device_response(self) -> Response {
        let (status, code) = self.status();
        tracing::debug!(
            error_code = %code,
            error_message = %self,
            "Device request rejected"
        );
        status.into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Device endpoint error: converts to a bodyless response
#[derive(Debug)]
pub struct DeviceError(pub ApiError);

impl From<ApiError> for DeviceError {
    fn from(e: ApiError) -> Self {
        DeviceError(e)
    }
}

impl From<RegistryError> for DeviceError {
    fn from(e: RegistryError) -> Self {
        DeviceError(e.into())
    }
}

impl From<RelayError> for DeviceError {
    fn from(e: RelayError) -> Self {
        DeviceError(e.into())
    }
}

impl IntoResponse for DeviceError {
    fn into_response(self) -> Response {
        self.0.into_device_response()
    }
}

/// Result type for device endpoints
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::ValueShape;

    #[test]
    fn test_device_codes() {
        assert_eq!(
            ApiError::MalformedPayload("x".into()).status().0,
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(ApiError::WrongMethod.status().0, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ApiError::UnknownEndpoint("/x".into()).status().0,
            StatusCode::NOT_FOUND
        );
        let mismatch = ApiError::from(RegistryError::ShapeMismatch {
            channel: "s:acc".into(),
            expected: ValueShape::Vector(3),
            found: ValueShape::Scalar,
        });
        assert_eq!(mismatch.status().0, StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_unknown_node_is_not_found() {
        let err = ApiError::from(RelayError::UnknownNode("x".into()));
        assert_eq!(err.status(), (StatusCode::NOT_FOUND, "UNKNOWN_NODE"));
    }

    #[test]
    fn test_relay_errors_are_client_errors() {
        // Delivery is fire-and-forget; every relay error is the caller's
        for err in [
            RelayError::UnknownNode("x".into()),
            RelayError::InvalidCommand("empty address".into()),
        ] {
            assert!(ApiError::from(err).status().0.is_client_error());
        }
        assert_eq!(
            ApiError::from(RelayError::InvalidCommand("x".into())).status(),
            (StatusCode::BAD_REQUEST, "INVALID_COMMAND")
        );
    }

    #[tokio::test]
    async fn test_device_response_has_empty_body() {
        let response = DeviceError(ApiError::WrongMethod).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_api_response_has_json_body() {
        let response = ApiError::NotFound("node x".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json["request_id"].is_string());
    }
}
