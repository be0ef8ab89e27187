//! Error taxonomy and the JSON envelope every rejection is rendered into.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::users::model::Role;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account temporarily locked due to too many failed login attempts")]
    AccountLocked,

    #[error("Account is not active")]
    AccountInactive,

    #[error("Not authorized to access this route")]
    TokenMissing,

    #[error("Not authorized to access this route")]
    TokenInvalid,

    #[error("User role '{0}' is not authorized to access this route")]
    RoleForbidden(Role),

    #[error("Not authorized to access this resource")]
    OwnershipForbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    // Display stays generic; the chain is only ever logged.
    #[error("Server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn resource_not_found() -> Self {
        AppError::NotFound("Resource not found".into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::AccountInactive
            | AppError::TokenMissing
            | AppError::TokenInvalid => StatusCode::UNAUTHORIZED,
            AppError::AccountLocked => StatusCode::LOCKED,
            AppError::RoleForbidden(_) | AppError::OwnershipForbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(ref e) = self {
            error!(error = %format!("{e:#}"), "internal error");
        }
        let status = self.status_code();
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
