use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::diagnostics::QueryError;

/// Body returned to clients for every server-side failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("SERVICE_DSN environment variable is required")]
    MissingDsn,

    #[error("invalid configuration: {0}")]
    InvalidSetting(String),

    #[error("failed to parse database config: {0}")]
    InvalidDsn(#[source] sqlx::Error),

    #[error("failed to reach database: {0}")]
    Connectivity(#[source] sqlx::Error),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

impl AppError {
    /// Configuration problems detected before any network activity.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::MissingDsn
                | AppError::InvalidSetting(_)
                | AppError::InvalidDsn(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        // Only query failures reach a handler; the rest are startup errors
        let code = match &self {
            AppError::Query(QueryError::Cancelled | QueryError::DeadlineExceeded) => "QUERY_ABORTED",
            AppError::Query(_) => "QUERY_ERROR",
            _ => "INTERNAL_ERROR",
        };

        // The cause stays server-side; clients only see the generic message.
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            error = %self,
            "Request failed"
        );

        (status, INTERNAL_ERROR_MESSAGE).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_classification() {
        assert!(AppError::MissingDsn.is_config());
        assert!(AppError::InvalidDsn(sqlx::Error::Configuration("bad".into())).is_config());
        assert!(!AppError::Connectivity(sqlx::Error::PoolTimedOut).is_config());
        assert!(!AppError::Query(QueryError::Cancelled).is_config());
    }

    #[test]
    fn test_invalid_setting_is_config() {
        let err = AppError::InvalidSetting("server.write_timeout_secs must be at least 1".into());
        assert!(err.is_config());
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_query_error_response_hides_cause() {
        let err = AppError::Query(QueryError::Database {
            what: "database version",
            source: sqlx::Error::Protocol("secret detail".into()),
        });
        assert!(err.to_string().contains("secret detail"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/plain"));
    }
}
