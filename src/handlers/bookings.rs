use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::handlers::{current_user, json_body, now, query_params};
use crate::models::BookingStatus;
use crate::services::availability;
use crate::services::ledger::{self, NewBooking, TransitionFields};
use crate::state::AppState;

// GET /bookings?status=&limit=
#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<BookingsQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    let query = query_params(params)?;

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| AppError::validation(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };

    let bookings = ledger::list_bookings(&state.db(), &user, status, query.limit.unwrap_or(50))?;
    Ok(Json(json!({ "bookings": bookings })))
}

// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewBooking>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user = current_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let booking = ledger::create_booking(&mut state.db(), &state.outbox, &user, req, now())?;
    Ok((StatusCode::CREATED, Json(json!({ "booking": booking }))))
}

// GET /bookings/available-slots?date=
#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<AvailableSlotsQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    current_user(&headers, &state.config)?;
    let query = query_params(params)?;

    let slots = availability::open_slots_on(&state.db(), query.date)?;
    Ok(Json(json!({ "slots": slots })))
}

// GET /bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;

    let booking = ledger::get_booking(&state.db(), &id, &user)?;
    Ok(Json(json!({ "booking": booking })))
}

// PATCH /bookings/:id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: BookingStatus,
    #[serde(flatten)]
    pub fields: TransitionFields,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    let change = json_body(payload)?;

    let booking = ledger::transition(
        &mut state.db(),
        &state.outbox,
        &id,
        &user,
        change.status,
        change.fields,
        now(),
    )?;
    Ok(Json(json!({ "booking": booking })))
}

// PUT /bookings/:id/meeting-link
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingLink {
    pub meeting_link: String,
}

pub async fn set_meeting_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<MeetingLink>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    let body = json_body(payload)?;

    let booking = ledger::set_meeting_link(
        &mut state.db(),
        &state.outbox,
        &id,
        &user,
        &body.meeting_link,
        now(),
    )?;
    Ok(Json(json!({ "booking": booking })))
}

// PUT /bookings/:id/reader
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reassignment {
    pub reader_id: String,
}

pub async fn reassign_reader(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<Reassignment>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    let body = json_body(payload)?;

    let booking = ledger::reassign_reader(
        &mut state.db(),
        &state.outbox,
        &id,
        &user,
        &body.reader_id,
        now(),
    )?;
    Ok(Json(json!({ "booking": booking })))
}
