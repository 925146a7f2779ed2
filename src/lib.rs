pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, patch, post, put};
use axum::Router;

use crate::state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/schedule",
            get(handlers::schedule::list_slots)
                .post(handlers::schedule::add_slot)
                .patch(handlers::schedule::toggle_slot)
                .delete(handlers::schedule::remove_slot),
        )
        .route("/schedule/bulk", post(handlers::schedule::bulk_generate))
        .route(
            "/bookings",
            get(handlers::bookings::list_bookings).post(handlers::bookings::create_booking),
        )
        .route(
            "/bookings/available-slots",
            get(handlers::bookings::available_slots),
        )
        .route(
            "/bookings/:id",
            get(handlers::bookings::get_booking).patch(handlers::bookings::update_status),
        )
        .route(
            "/bookings/:id/meeting-link",
            put(handlers::bookings::set_meeting_link),
        )
        .route("/bookings/:id/reader", put(handlers::bookings::reassign_reader))
        .route(
            "/bookings/:id/reschedule",
            post(handlers::reschedule::propose).get(handlers::reschedule::list_requests),
        )
        .route(
            "/bookings/:id/reschedule/:req_id",
            patch(handlers::reschedule::resolve),
        )
        .with_state(state)
}
