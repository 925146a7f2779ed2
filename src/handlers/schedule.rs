use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::handlers::{current_user, json_body, query_params, require_role};
use crate::models::availability::day_index;
use crate::models::{Role, SlotBasis, SlotCandidate, TimeWindow};
use crate::services::availability;
use crate::services::bulk::{self, BulkRequest};
use crate::state::AppState;

// GET /schedule
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    require_role(&user, Role::Reader)?;

    let slots = availability::list_slots(&state.db(), &user.id)?;
    Ok(Json(json!({ "slots": slots })))
}

// POST /schedule
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSlot {
    pub day_of_week: Option<u8>,
    pub specific_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub window: TimeWindow,
}

impl NewSlot {
    fn into_candidate(self) -> Result<SlotCandidate, AppError> {
        let window = TimeWindow::new(self.window.start_time, self.window.end_time)?;
        let basis = match (self.specific_date, self.day_of_week) {
            (Some(date), Some(day)) if day != day_index(date) => {
                return Err(AppError::validation(format!(
                    "{date} does not fall on day {day}"
                )));
            }
            (Some(date), _) => SlotBasis::Date(date),
            (None, Some(day)) => SlotBasis::weekly(day)?,
            (None, None) => {
                return Err(AppError::validation(
                    "dayOfWeek or specificDate is required",
                ))
            }
        };
        Ok(SlotCandidate { basis, window })
    }
}

pub async fn add_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewSlot>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user = current_user(&headers, &state.config)?;
    require_role(&user, Role::Reader)?;
    let candidate = json_body(payload)?.into_candidate()?;

    let slot = availability::add_slot(&mut state.db(), &user.id, candidate)?;
    Ok((StatusCode::CREATED, Json(json!({ "slot": slot }))))
}

// PATCH /schedule
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotToggle {
    pub id: String,
    pub is_available: bool,
}

pub async fn toggle_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SlotToggle>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    require_role(&user, Role::Reader)?;
    let toggle = json_body(payload)?;

    let slot =
        availability::set_slot_available(&state.db(), &user.id, &toggle.id, toggle.is_available)?;
    Ok(Json(json!({ "slot": slot })))
}

// DELETE /schedule?id=
#[derive(Debug, Deserialize)]
pub struct SlotIdQuery {
    pub id: Option<String>,
}

pub async fn remove_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<SlotIdQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    require_role(&user, Role::Reader)?;
    let id = query_params(params)?
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::validation("slot id is required"))?;

    availability::remove_slot(&state.db(), &user.id, &id)?;
    Ok(Json(json!({ "success": true })))
}

// POST /schedule/bulk
pub async fn bulk_generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let user = current_user(&headers, &state.config)?;
    require_role(&user, Role::Reader)?;
    let req = json_body(payload)?;

    let summary = bulk::generate(&mut state.db(), &user.id, &req)?;

    let mut body = json!({
        "count": summary.inserted,
        "skipped": summary.skipped,
        "skippedDetails": summary.skipped_details,
    });
    if summary.skipped > 0 {
        body["message"] = json!(format!(
            "added {} slots, skipped {} that conflict with existing slots",
            summary.inserted, summary.skipped
        ));
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_slot(json: &str) -> Result<SlotCandidate, AppError> {
        serde_json::from_str::<NewSlot>(json).unwrap().into_candidate()
    }

    #[test]
    fn test_new_slot_weekly() {
        let candidate =
            new_slot(r#"{"dayOfWeek":1,"startTime":"10:00","endTime":"11:00"}"#).unwrap();
        assert_eq!(candidate.basis, SlotBasis::Weekly(1));
    }

    #[test]
    fn test_new_slot_specific_date() {
        // 2025-06-16 is a Monday
        let candidate = new_slot(
            r#"{"dayOfWeek":1,"specificDate":"2025-06-16","startTime":"10:00","endTime":"11:00"}"#,
        )
        .unwrap();
        assert!(matches!(candidate.basis, SlotBasis::Date(_)));

        let mismatch = new_slot(
            r#"{"dayOfWeek":2,"specificDate":"2025-06-16","startTime":"10:00","endTime":"11:00"}"#,
        );
        assert!(matches!(mismatch, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_new_slot_rejects_bad_input() {
        assert!(matches!(
            new_slot(r#"{"dayOfWeek":1,"startTime":"11:00","endTime":"10:00"}"#),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_slot(r#"{"dayOfWeek":9,"startTime":"10:00","endTime":"11:00"}"#),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_slot(r#"{"startTime":"10:00","endTime":"11:00"}"#),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_new_slot_times_are_whole_minutes() {
        let zero_seconds = r#"{"dayOfWeek":1,"startTime":"10:00:00","endTime":"11:00:00"}"#;
        assert!(new_slot(zero_seconds).is_ok());

        let seconds = r#"{"dayOfWeek":1,"startTime":"09:00:10","endTime":"09:00:50"}"#;
        assert!(serde_json::from_str::<NewSlot>(seconds).is_err());
    }
}
