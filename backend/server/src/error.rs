use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{invite::RedeemError, reflections::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid code")]
    InvalidCode,

    #[error("Code already used")]
    CodeAlreadyUsed,

    #[error("{0}")]
    MalformedPayload(&'static str),

    #[error("Too many requests")]
    RateLimited,

    #[error("Spirit connection error.")]
    SpiritConnection,

    #[error("{0}")]
    Datastore(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<RedeemError> for AppError {
    fn from(err: RedeemError) -> Self {
        match err {
            RedeemError::NotFound => AppError::InvalidCode,
            RedeemError::AlreadyUsed => AppError::CodeAlreadyUsed,
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidCode => StatusCode::NOT_FOUND,
            AppError::CodeAlreadyUsed => StatusCode::CONFLICT,
            AppError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::SpiritConnection
            | AppError::Datastore { .. }
            | AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::InternalError(e) => {
                error!("Internal error: {e}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Error for the `/reflections` routes, whose bodies carry `success: false`.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ReflectionError(#[from] AppError);

impl From<StoreError> for ReflectionError {
    fn from(err: StoreError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ReflectionError {
    fn into_response(self) -> Response {
        let Self(err) = self;

        (
            err.status(),
            Json(json!({ "success": false, "error": err.message() })),
        )
            .into_response()
    }
}
