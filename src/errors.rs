use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, NaiveDateTime};

use crate::models::DayPeriod;

/// Outcomes the booking engine can reject a request with.
///
/// Everything except `Storage` and `Internal` is an expected, user-facing
/// result; those two are infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("technician not found: {0}")]
    TechnicianNotFound(String),

    #[error("technician {name} is not currently active")]
    UnavailableTechnician { name: String },

    #[error("booking {0} not found")]
    BookingNotFound(i64),

    #[error("{time} is outside {name}'s working hours ({hours})")]
    TimeOutsideWorkingHours {
        name: String,
        hours: String,
        time: NaiveDateTime,
    },

    #[error("{name} already has a booking overlapping {time}")]
    SchedulingConflict { name: String, time: NaiveDateTime },

    #[error("no open {technician_type} slot on {date}")]
    NoAvailableSlot {
        technician_type: String,
        date: NaiveDate,
        period: DayPeriod,
    },

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("completion service unavailable: {0}")]
    InterpreterUnavailable(String),

    #[error("could not determine what the user wants")]
    UnknownIntent,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, BookingError::Storage(_) | BookingError::Internal(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Booking(e) => match e {
                BookingError::TechnicianNotFound(_) | BookingError::BookingNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BookingError::SchedulingConflict { .. } | BookingError::NoAvailableSlot { .. } => {
                    StatusCode::CONFLICT
                }
                BookingError::UnavailableTechnician { .. }
                | BookingError::TimeOutsideWorkingHours { .. }
                | BookingError::InvalidTime(_)
                | BookingError::UnknownIntent => StatusCode::UNPROCESSABLE_ENTITY,
                BookingError::InterpreterUnavailable(_) => StatusCode::BAD_GATEWAY,
                BookingError::Storage(_) | BookingError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };

        let message = match &self {
            AppError::Booking(e) if e.is_infrastructure() => {
                tracing::error!(error = %e, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
