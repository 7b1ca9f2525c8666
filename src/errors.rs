use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Anonymous principal attempted an operation requiring a permission.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),
    /// Authenticated principal lacks the required permission.
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not unique: {0}")]
    NotUnique(String),
    /// Invariant violation, e.g. removing a group's last manager.
    #[error("not valid: {0}")]
    NotValid(String),
    /// Caller bug: a guarded operation carried no extractable resource identifier.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::NotAuthenticated(message.into())
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn not_unique(message: impl Into<String>) -> Self {
        Self::NotUnique(message.into())
    }

    pub fn not_valid(message: impl Into<String>) -> Self {
        Self::NotValid(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code surfaced in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated(_) => "NOT_AUTHENTICATED",
            AppError::NotAuthorized(_) => "NOT_AUTHORIZED",
            AppError::NotFound(_) => "RESOURCE_NOT_FOUND",
            AppError::NotUnique(_) => "NOT_UNIQUE",
            AppError::NotValid(_) => "NOT_VALID",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Token(_) => "TOKEN_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotUnique(_) => StatusCode::CONFLICT,
            AppError::NotValid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
