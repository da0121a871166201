use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::access::RoleDirectoryError;
use crate::workflows::submissions::{LegacyImportError, WorkflowError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Failures of the service as a whole, outside a single workflow call.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Migration(LegacyImportError),
    Json(serde_json::Error),
    Workflow(WorkflowError),
    Roles(RoleDirectoryError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Migration(err) => write!(f, "migration error: {}", err),
            AppError::Json(err) => write!(f, "json error: {}", err),
            AppError::Workflow(err) => write!(f, "workflow error: {}", err),
            AppError::Roles(err) => write!(f, "role directory error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Migration(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Workflow(err) => Some(err),
            AppError::Roles(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Migration(_)
            | AppError::Json(_)
            | AppError::Workflow(_)
            | AppError::Roles(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<LegacyImportError> for AppError {
    fn from(value: LegacyImportError) -> Self {
        Self::Migration(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<RoleDirectoryError> for AppError {
    fn from(value: RoleDirectoryError) -> Self {
        Self::Roles(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_errors_render_as_bad_request() {
        let response = AppError::from(LegacyImportError::NotAnObject).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn io_errors_render_as_internal() {
        let error = AppError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(error.to_string().starts_with("io error"));
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
