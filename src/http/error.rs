use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::error::ServiceError;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    wrong_fields: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(rename = "wrongFields", skip_serializing_if = "Option::is_none")]
    wrong_fields: Option<Vec<String>>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            wrong_fields: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        use ServiceError::*;

        let message = err.to_string();
        match err {
            AdNotFound | CityNotFound | UserNotFound | ImageNotFound => Self::not_found(message),
            AdAlreadyExists | UserAlreadyExists => Self::conflict(message),
            NotOwner | NoActiveSession | SessionExpired | MissingCsrfToken | InvalidCsrfToken
            | NotHost | InvalidCredentials => Self::unauthorized(message),
            IncorrectDataForms(fields) => Self {
                status: StatusCode::BAD_REQUEST,
                message,
                wrong_fields: Some(fields),
            },
            InvalidMetadata | InvalidMultipart | InvalidImage | InvalidCharacters
            | InputTooLong | RoomsOutOfRange | LimitNotInt | OffsetNotInt | BadFilter(_)
            | NoImages | TooManyImages | LastImage | InvalidDateRange | InvalidPriority
            | UrlInvalidCharacters | UrlTooLong | InvalidJson | NoSuchSession => {
                Self::bad_request(message)
            }
            DeadlineExceeded | Unavailable(_) | Internal(_) => {
                tracing::error!(error = %message, "request failed");
                Self::internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            wrong_fields: self.wrong_fields,
        });
        (self.status, body).into_response()
    }
}
