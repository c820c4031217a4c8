//! # Admin Guard
//!
//! Shared-secret check for admin-only routes. Callers present the secret in the
//! `x-admin-token` header.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{error::AppError, state::AppState};

pub const ADMIN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct AdminGuard {
    secret: Option<String>,
}

impl AdminGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: (!secret.is_empty()).then(|| secret.to_string()),
        }
    }

    /// True only when a secret is configured and `supplied` matches it exactly.
    pub fn authorize(&self, supplied: Option<&str>) -> bool {
        match (&self.secret, supplied) {
            (Some(secret), Some(supplied)) => secret.as_bytes().ct_eq(supplied.as_bytes()).into(),
            _ => false,
        }
    }
}

/// Extractor that only succeeds for requests carrying the admin secret.
pub struct Admin;

impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let supplied = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|value| value.to_str().ok());

        if state.guard.authorize(supplied) {
            Ok(Admin)
        } else {
            warn!("Rejected admin request to {}", parts.uri.path());
            Err(AppError::Forbidden)
        }
    }
}
