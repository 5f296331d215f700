use auth::AuthError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use desktop_bridge::BridgeError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("privacy consent for remote API usage has not been given")]
    ConsentRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized("authentication required".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::NotConfigured(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ConsentRequired => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotConfigured(_) => "not_configured",
            Self::Unauthorized(_) => "unauthorized",
            Self::ConsentRequired => "consent_required",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to hand to the client. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(err) => {
                error!("request failed: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "error": self.code(), "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::Unauthorized(value.to_string()),
            AuthError::EmailTaken => Self::Conflict(value.to_string()),
            AuthError::InvalidInput(msg) => Self::BadRequest(msg),
            AuthError::DesktopMode => Self::BadRequest(value.to_string()),
            AuthError::Session(err) => Self::Internal(anyhow::Error::new(err)),
            AuthError::Internal(err) => Self::Internal(err),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(value: BridgeError) -> Self {
        match value {
            BridgeError::Message(msg) => Self::BadRequest(msg),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}
