//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the application.
//! Every handler returns `Result<_, AppError>`, and `AppError` implements
//! `actix_web::error::ResponseError` so failures turn into JSON bodies of the form
//! `{"error": "..."}` with the matching status code.
//!
//! Internal failures (database, codec, filesystem) are logged with their detail and
//! reported to the client with a generic message only.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::imaging::ImageError;

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication failed or is missing (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Malformed or disallowed request (HTTP 400).
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// The resource does not exist or is not owned by the caller (HTTP 404).
    #[error("Not Found: {0}")]
    NotFound(String),
    /// Unexpected server-side failure (HTTP 500).
    #[error("Internal Server Error: {0}")]
    InternalServerError(String),
    /// Failure from `sqlx` (HTTP 500).
    #[error("Database Error: {0}")]
    DatabaseError(String),
    /// Input failed schema validation (HTTP 400).
    #[error("Validation Error: {0}")]
    ValidationError(String),
    /// Uploaded content is not a decodable image (HTTP 400).
    #[error("Invalid Image: {0}")]
    InvalidImage(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::ValidationError(_) | AppError::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Unauthorized(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::InvalidImage(msg) => msg.clone(),
            // Details stay in the log; clients only learn that something went wrong.
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                log::error!("{}", self);
                "Something went wrong".to_string()
            }
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

/// `RowNotFound` becomes `NotFound`; everything else is a database failure.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> AppError {
        AppError::DatabaseError(error.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Unauthorized(error.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

impl From<ImageError> for AppError {
    fn from(error: ImageError) -> AppError {
        match error {
            ImageError::InvalidImage(msg) => AppError::InvalidImage(msg),
            ImageError::Processing(msg) => {
                AppError::InternalServerError(format!("Image processing failed: {}", msg))
            }
        }
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(error: actix_multipart::MultipartError) -> AppError {
        AppError::BadRequest(format!("Invalid multipart payload: {}", error))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(error: actix_web::error::BlockingError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

impl From<crate::email::MailError> for AppError {
    fn from(error: crate::email::MailError) -> AppError {
        AppError::InternalServerError(format!("Failed to send email: {}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}
