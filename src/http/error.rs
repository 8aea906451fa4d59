use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::error::MuralError;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl From<MuralError> for AppError {
    fn from(err: MuralError) -> Self {
        match err {
            MuralError::Validation(message) => Self::bad_request(message),
            MuralError::NotFound(_) => Self::not_found("post not found"),
            MuralError::EditWindowClosed(_) => Self::forbidden("edit window has closed"),
            MuralError::Forbidden(message) => Self::forbidden(message),
            MuralError::Unconfirmed => Self::bad_request("delete requires confirmation"),
            MuralError::InFlight(what) => Self::conflict(format!("{} already in progress", what)),
            err @ MuralError::PartialDelete { .. } => {
                tracing::warn!(error = %err, "thread only partly deleted");
                Self::internal(err.to_string())
            }
            MuralError::StoreWrite(err) => {
                tracing::error!(error = ?err, "store write failed");
                Self::internal("failed to save changes")
            }
            MuralError::StoreSubscription(err) => {
                tracing::error!(error = ?err, "live feed unavailable");
                Self::unavailable("live feed unavailable")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
