use chrono::{NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::reschedule::DEFAULT_REJECTION_REASON;
use crate::models::{
    BookingStatus, CurrentUser, Notification, NotificationKind, Rejection, RescheduleRequest,
    RescheduleStatus, Role,
};
use crate::services::ledger::{find_overlapping_booking, format_when};
use crate::services::notify::Outbox;

const RECENT_REQUESTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Accept,
    Reject,
}

/// Opens a new pending request on the booking, superseding whatever was pending before.
pub fn propose(
    conn: &mut Connection,
    outbox: &Outbox,
    booking_id: &str,
    actor: &CurrentUser,
    proposed_start: NaiveDateTime,
    proposed_end: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<RescheduleRequest, AppError> {
    if proposed_start >= proposed_end {
        return Err(AppError::validation("proposed start must be before proposed end"));
    }
    if !on_whole_minute(&proposed_start) || !on_whole_minute(&proposed_end) {
        return Err(AppError::validation("proposed times must be on whole minutes"));
    }

    let tx = db::begin(conn)?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking not found"))?;
    if booking.status.is_terminal() {
        return Err(AppError::invalid_state(format!(
            "cannot reschedule a {} booking",
            booking.status.as_str()
        )));
    }

    let not_participant =
        || AppError::forbidden("only the booking's student or reader can propose a new time");
    let (side, counterparty_role) = match booking.side_of(actor) {
        Some(Role::Student) => (Role::Student, Role::Reader),
        Some(Role::Reader) => (Role::Reader, Role::Student),
        _ => return Err(not_participant()),
    };
    let counterparty = booking
        .counterparty(&actor.id)
        .map(str::to_owned)
        .ok_or_else(not_participant)?;

    let request = RescheduleRequest {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        requested_by: actor.id.clone(),
        requested_by_role: side,
        proposed_slot_start: proposed_start,
        proposed_slot_end: proposed_end,
        status: RescheduleStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let superseded = queries::supersede_pending_requests(&tx, &booking.id, &request.id, &now)?;
    queries::insert_reschedule_request(&tx, &request)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        request_id = %request.id,
        requested_by = %actor.id,
        superseded,
        "reschedule proposed"
    );

    outbox.send(
        Notification::new(
            counterparty,
            NotificationKind::RescheduleRequest,
            "Reschedule requested",
            format!(
                "A new time was proposed for your session: {} to {}.",
                format_when(&proposed_start),
                proposed_end.format("%H:%M")
            ),
            counterparty_role.sessions_link(),
        )
        .for_booking(&booking.id),
    );

    Ok(request)
}

fn on_whole_minute(t: &NaiveDateTime) -> bool {
    t.second() == 0 && t.nanosecond() == 0
}

/// Accepts or rejects a pending request. The requester can never resolve their own proposal.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    conn: &mut Connection,
    outbox: &Outbox,
    booking_id: &str,
    request_id: &str,
    actor: &CurrentUser,
    action: ResolveAction,
    rejection_reason: Option<String>,
    now: NaiveDateTime,
) -> Result<RescheduleRequest, AppError> {
    let tx = db::begin(conn)?;

    let mut request = queries::get_reschedule_request(&tx, request_id)?
        .filter(|r| r.booking_id == booking_id)
        .ok_or_else(|| AppError::not_found("reschedule request not found"))?;

    if request.requested_by == actor.id {
        return Err(AppError::forbidden("you cannot resolve your own request"));
    }
    if !request.status.is_pending() {
        return Err(AppError::not_found(
            "reschedule request not found or already resolved",
        ));
    }

    let mut booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking not found"))?;
    if !actor.is_admin() && booking.side_of(actor).is_none() {
        return Err(AppError::forbidden("you are not part of this booking"));
    }

    request.updated_at = now;
    match action {
        ResolveAction::Accept => {
            if booking.status.is_terminal() {
                return Err(AppError::invalid_state(format!(
                    "booking is already {}",
                    booking.status.as_str()
                )));
            }
            if let Some(other) = find_overlapping_booking(
                &tx,
                &booking.reader_id,
                request.proposed_slot_start,
                request.proposed_slot_end,
                Some(booking.id.as_str()),
            )? {
                tracing::debug!(
                    booking_id = %booking.id,
                    blocking = %other.id,
                    "reschedule blocked"
                );
                return Err(AppError::conflict(
                    "the reader already has a session at the proposed time",
                ));
            }

            booking.slot_start = request.proposed_slot_start;
            booking.slot_end = request.proposed_slot_end;
            booking.status = BookingStatus::Confirmed;
            booking.updated_at = now;
            queries::update_booking(&tx, &booking)?;

            request.status = RescheduleStatus::Accepted;
        }
        ResolveAction::Reject => {
            let reason = rejection_reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
            request.status = RescheduleStatus::Rejected(Rejection::Declined(reason));
        }
    }

    queries::update_reschedule_status(&tx, &request)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        request_id = %request.id,
        resolved_by = %actor.id,
        status = request.status.as_str(),
        "reschedule resolved"
    );

    let link = request.requested_by_role.sessions_link();
    let notification = match &request.status {
        RescheduleStatus::Accepted => Notification::new(
            &request.requested_by,
            NotificationKind::RescheduleAccepted,
            "Reschedule accepted",
            format!(
                "Your new time was accepted: {}.",
                format_when(&request.proposed_slot_start)
            ),
            link,
        ),
        _ => Notification::new(
            &request.requested_by,
            NotificationKind::RescheduleRejected,
            "Reschedule rejected",
            request.rejection_reason().unwrap_or(DEFAULT_REJECTION_REASON),
            link,
        ),
    };
    outbox.send(notification.for_booking(&booking.id));

    Ok(request)
}

pub fn list_requests(
    conn: &Connection,
    booking_id: &str,
    actor: &CurrentUser,
) -> Result<Vec<RescheduleRequest>, AppError> {
    let booking = queries::get_booking_by_id(conn, booking_id)?
        .filter(|b| actor.is_admin() || b.is_participant(&actor.id))
        .ok_or_else(|| AppError::not_found("booking not found"))?;

    Ok(queries::get_recent_reschedule_requests(
        conn,
        &booking.id,
        RECENT_REQUESTS,
    )?)
}
