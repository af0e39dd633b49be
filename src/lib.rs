pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat", post(handlers::chat::process_request))
        .route("/api/technicians", get(handlers::technicians::list_technicians))
        .route(
            "/api/technicians/:id/availability",
            get(handlers::technicians::get_availability),
        )
        .route(
            "/api/bookings",
            get(handlers::bookings::list_bookings).delete(handlers::bookings::delete_all_bookings),
        )
        .route(
            "/api/bookings/:id",
            get(handlers::bookings::get_booking).delete(handlers::bookings::cancel_booking),
        )
        .with_state(state)
}
