use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Slot, Technician};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TechniciansQuery {
    pub technician_type: Option<String>,
}

// GET /api/technicians
pub async fn list_technicians(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TechniciansQuery>,
) -> Result<Json<Vec<Technician>>, AppError> {
    let technicians = state.store.list_technicians(true)?;
    let technicians = match query.technician_type.as_deref() {
        Some(t) => technicians.into_iter().filter(|tech| tech.matches_type(t)).collect(),
        None => technicians,
    };
    Ok(Json(technicians))
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    technician: Technician,
    date: NaiveDate,
    working_hours: String,
    available_slots: Vec<Slot>,
}

// GET /api/technicians/:id/availability?date=YYYY-MM-DD
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let technician = state.store.get_technician(id)?;
    let available_slots = state.store.available_slots(id, query.date)?;

    Ok(Json(AvailabilityResponse {
        working_hours: technician.working_hours_label(),
        technician,
        date: query.date,
        available_slots,
    }))
}
