use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::BookingDetails;
use crate::state::AppState;

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookingDetails>>, AppError> {
    Ok(Json(state.store.list_bookings()?))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.store.get_booking(id)?))
}

// DELETE /api/bookings/:id
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.store.cancel_booking(id)?))
}

#[derive(Serialize)]
pub struct DeleteAllResponse {
    deleted: usize,
    message: String,
}

// DELETE /api/bookings
pub async fn delete_all_bookings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeleteAllResponse>, AppError> {
    let deleted = state.store.delete_all_bookings()?;
    Ok(Json(DeleteAllResponse {
        deleted,
        message: format!("Successfully cancelled {deleted} bookings"),
    }))
}
