use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::handlers::{current_user, json_body, now};
use crate::services::reschedule::{self, ResolveAction};
use crate::state::AppState;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Accepts ISO timestamps with or without an offset. An offset is dropped and the wall-clock
/// time kept, matching how slot times are stored.
fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn wall_clock<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse_wall_clock(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

// POST /bookings/:id/reschedule
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(deserialize_with = "wall_clock")]
    pub proposed_slot_start: NaiveDateTime,
    #[serde(deserialize_with = "wall_clock")]
    pub proposed_slot_end: NaiveDateTime,
}

pub async fn propose(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    payload: Result<Json<Proposal>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    let proposal = json_body(payload)?;

    let request = reschedule::propose(
        &mut state.db(),
        &state.outbox,
        &booking_id,
        &user,
        proposal.proposed_slot_start,
        proposal.proposed_slot_end,
        now(),
    )?;
    Ok(Json(json!({ "success": true, "requestId": request.id })))
}

// GET /bookings/:id/reschedule
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;

    let requests = reschedule::list_requests(&state.db(), &booking_id, &user)?;
    Ok(Json(json!({ "requests": requests })))
}

// PATCH /bookings/:id/reschedule/:req_id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub action: ResolveAction,
    pub rejection_reason: Option<String>,
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((booking_id, request_id)): Path<(String, String)>,
    payload: Result<Json<Resolution>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    let resolution = json_body(payload)?;

    reschedule::resolve(
        &mut state.db(),
        &state.outbox,
        &booking_id,
        &request_id,
        &user,
        resolution.action,
        resolution.rejection_reason,
        now(),
    )?;
    Ok(Json(json!({ "success": true })))
}
