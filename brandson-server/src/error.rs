//! Unified service-layer error type
//!
//! `ServiceError` bridges storage / infrastructure errors and the API-layer
//! `AppError`, so stores can use `?` on both.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};
use shared::models::TransitionError;

use crate::db::StorageError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// - `Db`: storage or infrastructure error (logged, mapped to InternalError)
/// - `App`: business-rule error, passed through to the client
#[derive(Debug)]
pub enum ServiceError {
    Db(BoxError),
    App(AppError),
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Db(e.into())
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Db(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        ServiceError::App(e.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Service storage error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Db(e) => write!(f, "storage error: {e}"),
            ServiceError::App(e) => write!(f, "{e}"),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
