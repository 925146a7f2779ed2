use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db;
use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, CurrentUser, Notification, NotificationKind, Role};
use crate::services::notify::Outbox;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub slot_id: String,
    pub date: NaiveDate,
    pub recitation_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionFields {
    pub cancellation_reason: Option<String>,
    pub meeting_link: Option<String>,
}

pub(crate) fn format_when(ts: &NaiveDateTime) -> String {
    ts.format("%A, %B %-d, %Y at %H:%M").to_string()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// First active booking of `reader_id` overlapping `[start, end)`, ignoring `exclude`.
pub fn find_overlapping_booking(
    conn: &Connection,
    reader_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude: Option<&str>,
) -> anyhow::Result<Option<Booking>> {
    let candidates = queries::get_active_bookings_in_range(conn, Some(reader_id), &start, &end)?;
    Ok(candidates
        .into_iter()
        .find(|b| Some(b.id.as_str()) != exclude && b.overlaps_window(start, end)))
}

/// Reserves an open slot on `date` for the student. The booking starts out pending.
pub fn create_booking(
    conn: &mut Connection,
    outbox: &Outbox,
    student: &CurrentUser,
    req: NewBooking,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if student.role != Role::Student {
        return Err(AppError::forbidden("only students can book sessions"));
    }

    let tx = db::begin(conn)?;

    let slot = queries::get_slot(&tx, &req.slot_id)?
        .ok_or_else(|| AppError::not_found("slot not found"))?;
    if !slot.is_available {
        return Err(AppError::conflict("this slot is not open for booking"));
    }
    if !slot.applies_to(req.date) {
        return Err(AppError::validation(format!(
            "slot is not offered on {}",
            req.date
        )));
    }

    let slot_start = req.date.and_time(slot.start_time);
    let slot_end = req.date.and_time(slot.end_time);

    if let Some(existing) =
        find_overlapping_booking(&tx, &slot.reader_id, slot_start, slot_end, None)?
    {
        tracing::debug!(booking_id = %existing.id, "slot already booked");
        return Err(AppError::conflict(
            "this time is already booked, please choose another slot",
        ));
    }

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        student_id: student.id.clone(),
        reader_id: slot.reader_id.clone(),
        recitation_id: req.recitation_id,
        slot_id: Some(slot.id.clone()),
        slot_start,
        slot_end,
        status: BookingStatus::Pending,
        meeting_link: None,
        notes: non_blank(req.notes.as_deref()),
        cancellation_reason: None,
        cancelled_by: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        student_id = %booking.student_id,
        reader_id = %booking.reader_id,
        "booking created"
    );

    outbox.send(
        Notification::new(
            &booking.reader_id,
            NotificationKind::SessionBooked,
            "New session booked",
            format!("A session was booked with you on {}.", format_when(&booking.slot_start)),
            Role::Reader.sessions_link(),
        )
        .for_booking(&booking.id),
    );

    Ok(booking)
}

/// Applies one edge of the booking state machine on behalf of `actor`.
pub fn transition(
    conn: &mut Connection,
    outbox: &Outbox,
    booking_id: &str,
    actor: &CurrentUser,
    new_status: BookingStatus,
    fields: TransitionFields,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if new_status == BookingStatus::Rescheduled {
        return Err(AppError::invalid_state(
            "bookings are rescheduled through a reschedule request",
        ));
    }
    let cancellation_reason = non_blank(fields.cancellation_reason.as_deref());
    if new_status == BookingStatus::Cancelled && cancellation_reason.is_none() {
        return Err(AppError::validation("a cancellation reason is required"));
    }

    let tx = db::begin(conn)?;

    let mut booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking not found"))?;

    if !actor.is_admin() && booking.side_of(actor).is_none() {
        return Err(AppError::forbidden("you are not part of this booking"));
    }
    if booking.status.is_terminal() {
        return Err(AppError::invalid_state(format!(
            "booking is already {}",
            booking.status.as_str()
        )));
    }
    if !booking.status.can_transition_to(new_status) {
        return Err(AppError::invalid_state(format!(
            "cannot move a {} booking to {}",
            booking.status.as_str(),
            new_status.as_str()
        )));
    }

    let is_reader_side = actor.is_admin() || booking.side_of(actor) == Some(Role::Reader);
    match new_status {
        BookingStatus::Confirmed | BookingStatus::Completed | BookingStatus::NoShow
            if !is_reader_side =>
        {
            return Err(AppError::forbidden(
                "only the reader or an admin can make this change",
            ));
        }
        BookingStatus::Completed if now < booking.slot_end => {
            return Err(AppError::invalid_state("the session has not ended yet"));
        }
        BookingStatus::NoShow if now < booking.slot_start => {
            return Err(AppError::invalid_state("the session has not started yet"));
        }
        _ => {}
    }

    booking.status = new_status;
    booking.updated_at = now;
    if new_status == BookingStatus::Cancelled {
        booking.cancellation_reason = cancellation_reason;
        booking.cancelled_by = Some(actor.id.clone());
        booking.cancelled_at = Some(now);
    }
    if let Some(link) = non_blank(fields.meeting_link.as_deref()) {
        booking.meeting_link = Some(link);
    }

    queries::update_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        actor = %actor.id,
        status = booking.status.as_str(),
        "booking status changed"
    );

    match new_status {
        BookingStatus::Confirmed => outbox.send(
            Notification::new(
                &booking.student_id,
                NotificationKind::BookingConfirmed,
                "Session confirmed",
                format!("Your session on {} is confirmed.", format_when(&booking.slot_start)),
                Role::Student.sessions_link(),
            )
            .for_booking(&booking.id),
        ),
        BookingStatus::Cancelled => {
            let reason = booking.cancellation_reason.clone().unwrap_or_default();
            for (user_id, role) in [
                (&booking.student_id, Role::Student),
                (&booking.reader_id, Role::Reader),
            ] {
                if *user_id == actor.id {
                    continue;
                }
                outbox.send(
                    Notification::new(
                        user_id,
                        NotificationKind::BookingCancelled,
                        "Session cancelled",
                        format!(
                            "The session on {} was cancelled: {reason}",
                            format_when(&booking.slot_start)
                        ),
                        role.sessions_link(),
                    )
                    .for_booking(&booking.id),
                );
            }
        }
        _ => {}
    }

    Ok(booking)
}

/// Admin escalation: hands an active booking to another reader, keeping its window.
pub fn reassign_reader(
    conn: &mut Connection,
    outbox: &Outbox,
    booking_id: &str,
    actor: &CurrentUser,
    new_reader_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if !actor.is_admin() {
        return Err(AppError::forbidden("only admins can reassign bookings"));
    }
    let new_reader_id = new_reader_id.trim();
    if new_reader_id.is_empty() {
        return Err(AppError::validation("a reader id is required"));
    }

    let tx = db::begin(conn)?;

    let mut booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking not found"))?;
    if booking.status.is_terminal() {
        return Err(AppError::invalid_state(format!(
            "booking is already {}",
            booking.status.as_str()
        )));
    }

    if find_overlapping_booking(
        &tx,
        new_reader_id,
        booking.slot_start,
        booking.slot_end,
        Some(booking.id.as_str()),
    )?
    .is_some()
    {
        return Err(AppError::conflict(
            "the new reader already has a session at this time",
        ));
    }

    let previous_reader = std::mem::replace(&mut booking.reader_id, new_reader_id.to_string());
    booking.updated_at = now;
    queries::update_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        from = %previous_reader,
        to = %booking.reader_id,
        "booking reassigned"
    );

    let when = format_when(&booking.slot_start);
    outbox.send(
        Notification::new(
            &booking.student_id,
            NotificationKind::BookingReassigned,
            "Your session has a new reader",
            format!("Your session on {when} was assigned to a different reader."),
            Role::Student.sessions_link(),
        )
        .for_booking(&booking.id),
    );
    outbox.send(
        Notification::new(
            &booking.reader_id,
            NotificationKind::BookingReassigned,
            "Session assigned to you",
            format!("A session on {when} was assigned to you."),
            Role::Reader.sessions_link(),
        )
        .for_booking(&booking.id),
    );

    Ok(booking)
}

pub fn set_meeting_link(
    conn: &mut Connection,
    outbox: &Outbox,
    booking_id: &str,
    actor: &CurrentUser,
    link: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let link = non_blank(Some(link))
        .ok_or_else(|| AppError::validation("a meeting link is required"))?;

    let tx = db::begin(conn)?;
    let mut booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking not found"))?;

    if !actor.is_admin() && booking.side_of(actor) != Some(Role::Reader) {
        return Err(AppError::forbidden("only the booking's reader can set the meeting link"));
    }
    if booking.status.is_terminal() {
        return Err(AppError::invalid_state(format!(
            "booking is already {}",
            booking.status.as_str()
        )));
    }

    booking.meeting_link = Some(link);
    booking.updated_at = now;
    queries::update_booking(&tx, &booking)?;
    tx.commit()?;

    outbox.send(
        Notification::new(
            &booking.student_id,
            NotificationKind::MeetingLink,
            "Meeting link added",
            "Your reader added the link for your upcoming session.",
            Role::Student.sessions_link(),
        )
        .for_booking(&booking.id),
    );

    Ok(booking)
}

/// Bookings outside the caller's scope read as missing.
pub fn get_booking(
    conn: &Connection,
    booking_id: &str,
    actor: &CurrentUser,
) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, booking_id)?
        .filter(|b| actor.is_admin() || b.is_participant(&actor.id))
        .ok_or_else(|| AppError::not_found("booking not found"))
}

pub fn list_bookings(
    conn: &Connection,
    actor: &CurrentUser,
    status: Option<BookingStatus>,
    limit: i64,
) -> Result<Vec<Booking>, AppError> {
    let filter = match actor.role {
        Role::Student => BookingFilter {
            student_id: Some(actor.id.as_str()),
            status,
            ..Default::default()
        },
        Role::Reader => BookingFilter {
            reader_id: Some(actor.id.as_str()),
            status,
            ..Default::default()
        },
        Role::Admin => BookingFilter {
            status,
            ..Default::default()
        },
    };
    Ok(queries::list_bookings(conn, &filter, limit.clamp(1, 200))?)
}
