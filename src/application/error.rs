use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::storage::StorageError, domain::BundleError, infra::error::InfraError,
};

/// Diagnostic detail attached to error responses and logged by the
/// response-logging middleware. Never sent to the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Storage(StorageError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Storage(StorageError::InvalidPath(_)) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Bundle(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(StorageError::MissingParent(_) | StorageError::Io(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Storage(StorageError::NotFound(_)) => {
                "Resource not found"
            }
            AppError::Storage(StorageError::InvalidPath(_)) | AppError::Validation(_) => {
                "Request could not be processed"
            }
            AppError::Bundle(_) => "Service temporarily unavailable",
            AppError::Storage(_) => "I/O failure during request",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_) | InfraError::Artifact { .. }) => {
                "I/O failure during request"
            }
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_http_statuses() {
        let not_found = AppError::from(StorageError::NotFound("app.js".into())).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = AppError::from(StorageError::InvalidPath("../x".into())).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let io = AppError::from(StorageError::Io(std::io::Error::other("disk"))).into_response();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reports_carry_the_error_chain() {
        let response = AppError::from(InfraError::artifact(
            "dist/ssr-server-bundle.json",
            std::io::Error::other("gone"),
        ))
        .into_response();

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(report.messages[0].contains("ssr-server-bundle.json"));
        assert!(report.messages.iter().any(|message| message == "gone"));
    }
}
