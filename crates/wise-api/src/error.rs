use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use wise_core::StoreError;
use wise_core::accounts::AccountError;
use wise_core::attachments::AttachmentError;
use wise_core::consultations::ConsultationError;
use wise_core::expert::WorkflowError;
use wise_core::settings::SettingsError;
use wise_types::ValidationError;
use wise_types::api::ErrorBody;

/// Error response with a `{"error": "..."}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        error!("Internal error: {}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthenticated => Self::unauthorized(e.to_string()),
            StoreError::Local(_) => Self::internal(e),
            other => {
                error!("Backend call failed: {}", other);
                Self::new(StatusCode::BAD_GATEWAY, other.to_string())
            }
        }
    }
}

impl From<ConsultationError> for ApiError {
    fn from(e: ConsultationError) -> Self {
        match e {
            ConsultationError::Validation(v) => v.into(),
            ConsultationError::Local(s) => s.into(),
            ConsultationError::NoDevice => {
                Self::unauthorized("request a session from /auth/anonymous to store consultations locally")
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Unauthenticated => Self::unauthorized(e.to_string()),
            WorkflowError::Unauthorized => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            WorkflowError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            WorkflowError::InvalidTransition { .. } => Self::new(StatusCode::CONFLICT, e.to_string()),
            WorkflowError::Validation(v) => v.into(),
            WorkflowError::Store(s) => s.into(),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Validation(v) => v.into(),
            AccountError::InvalidCredentials => Self::unauthorized(e.to_string()),
            AccountError::Unauthorized(_) => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            AccountError::Rejected(_) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            AccountError::Store(s) => s.into(),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Unauthorized => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            SettingsError::Store(s) => s.into(),
        }
    }
}

impl From<AttachmentError> for ApiError {
    fn from(e: AttachmentError) -> Self {
        match e {
            AttachmentError::Unauthenticated => Self::unauthorized(e.to_string()),
            AttachmentError::UnsupportedType(_) => {
                Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
            }
            AttachmentError::TooLarge { .. } => Self::new(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
            AttachmentError::Empty => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            AttachmentError::Store(s) => s.into(),
        }
    }
}
