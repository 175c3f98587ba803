use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::{auth::repo::StoreError, email::DeliveryError};

/// Body shared by every plain acknowledgement and every error response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Username or email is already registered.")]
    DuplicateIdentity,

    /// Same message whether the account is unknown or the password is wrong.
    #[error("Invalid credentials.")]
    InvalidCredentials,

    /// Same message whether the token never existed, mismatched or expired.
    #[error("Invalid or expired token.")]
    InvalidOrExpiredToken,

    #[error("Invalid or expired session.")]
    Unauthorized,

    #[error("Failed to send email.")]
    Delivery(#[from] DeliveryError),

    #[error("Internal server error.")]
    Server(anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn server(err: impl Into<anyhow::Error>) -> Self {
        Self::Server(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::DuplicateIdentity | Self::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Delivery(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Server(err.into())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentity => Self::DuplicateIdentity,
            StoreError::Database(e) => Self::Server(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Server(err) => error!(error = ?err, "server fault"),
            Self::Delivery(err) => error!(error = %err, "email delivery fault"),
            _ => {}
        }
        let status = self.status();
        (status, Json(MessageResponse::new(self.to_string()))).into_response()
    }
}
