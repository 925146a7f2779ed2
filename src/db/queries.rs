use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::availability::{day_index, format_time, parse_time};
use crate::models::booking::ACTIVE_STATUSES;
use crate::models::{
    AvailabilitySlot, Booking, BookingStatus, RescheduleRequest, RescheduleStatus, Role,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid stored timestamp {s:?}: {e}"))
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid stored date {s:?}: {e}"))
}

fn active_status_list() -> String {
    ACTIVE_STATUSES
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Availability Slots ──

const SLOT_COLUMNS: &str =
    "id, reader_id, day_of_week, specific_date, start_time, end_time, is_recurring, is_available";

pub fn insert_slot(conn: &Connection, slot: &AvailabilitySlot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO availability_slots (id, reader_id, day_of_week, specific_date, start_time, end_time, is_recurring, is_available)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            slot.id,
            slot.reader_id,
            slot.day_of_week,
            slot.specific_date.map(|d| d.format(DATE_FORMAT).to_string()),
            format_time(&slot.start_time),
            format_time(&slot.end_time),
            slot.is_recurring,
            slot.is_available,
        ],
    )?;
    Ok(())
}

pub fn get_slots_for_reader(
    conn: &Connection,
    reader_id: &str,
) -> anyhow::Result<Vec<AvailabilitySlot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM availability_slots
         WHERE reader_id = ?1
         ORDER BY day_of_week ASC, specific_date IS NOT NULL, specific_date ASC, start_time ASC"
    ))?;

    let rows = stmt.query_map(params![reader_id], |row| Ok(parse_slot_row(row)))?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row??);
    }
    Ok(slots)
}

pub fn get_slot(conn: &Connection, id: &str) -> anyhow::Result<Option<AvailabilitySlot>> {
    let result = conn
        .query_row(
            &format!("SELECT {SLOT_COLUMNS} FROM availability_slots WHERE id = ?1"),
            params![id],
            |row| Ok(parse_slot_row(row)),
        )
        .optional()?;

    result.transpose()
}

/// Open slots of every reader that apply to `date`, earliest first.
pub fn get_available_slots_on(
    conn: &Connection,
    date: NaiveDate,
) -> anyhow::Result<Vec<AvailabilitySlot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM availability_slots
         WHERE is_available = 1
           AND ((is_recurring = 1 AND day_of_week = ?1) OR (is_recurring = 0 AND specific_date = ?2))
         ORDER BY start_time ASC, reader_id ASC"
    ))?;

    let rows = stmt.query_map(
        params![day_index(date), date.format(DATE_FORMAT).to_string()],
        |row| Ok(parse_slot_row(row)),
    )?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row??);
    }
    Ok(slots)
}

pub fn delete_slot(conn: &Connection, reader_id: &str, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM availability_slots WHERE id = ?1 AND reader_id = ?2",
        params![id, reader_id],
    )?;
    Ok(count > 0)
}

pub fn set_slot_available(
    conn: &Connection,
    reader_id: &str,
    id: &str,
    available: bool,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE availability_slots SET is_available = ?1 WHERE id = ?2 AND reader_id = ?3",
        params![available, id, reader_id],
    )?;
    Ok(count > 0)
}

fn parse_slot_row(row: &rusqlite::Row) -> anyhow::Result<AvailabilitySlot> {
    let specific_date: Option<String> = row.get(3)?;
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;

    Ok(AvailabilitySlot {
        id: row.get(0)?,
        reader_id: row.get(1)?,
        day_of_week: row.get(2)?,
        specific_date: specific_date.as_deref().map(parse_date).transpose()?,
        start_time: parse_time(&start_time)?,
        end_time: parse_time(&end_time)?,
        is_recurring: row.get(6)?,
        is_available: row.get(7)?,
    })
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, student_id, reader_id, recitation_id, slot_id, slot_start, slot_end, status, meeting_link, notes, cancellation_reason, cancelled_by, cancelled_at, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            booking.id,
            booking.student_id,
            booking.reader_id,
            booking.recitation_id,
            booking.slot_id,
            fmt_ts(&booking.slot_start),
            fmt_ts(&booking.slot_end),
            booking.status.as_str(),
            booking.meeting_link,
            booking.notes,
            booking.cancellation_reason,
            booking.cancelled_by,
            booking.cancelled_at.as_ref().map(fmt_ts),
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Writes every mutable column of `booking`. Returns false if the row is gone.
pub fn update_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           reader_id = ?1, slot_start = ?2, slot_end = ?3, status = ?4, meeting_link = ?5,
           cancellation_reason = ?6, cancelled_by = ?7, cancelled_at = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            booking.reader_id,
            fmt_ts(&booking.slot_start),
            fmt_ts(&booking.slot_end),
            booking.status.as_str(),
            booking.meeting_link,
            booking.cancellation_reason,
            booking.cancelled_by,
            booking.cancelled_at.as_ref().map(fmt_ts),
            fmt_ts(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

/// Active bookings touching `[start, end]`, optionally for one reader. Callers apply the
/// exact half-open overlap test on the result.
pub fn get_active_bookings_in_range(
    conn: &Connection,
    reader_id: Option<&str>,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status IN ({}) AND slot_start <= ?1 AND slot_end >= ?2
           AND (?3 IS NULL OR reader_id = ?3)
         ORDER BY slot_start ASC",
        active_status_list()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_ts(end), fmt_ts(start), reader_id], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

#[derive(Debug, Default)]
pub struct BookingFilter<'a> {
    pub student_id: Option<&'a str>,
    pub reader_id: Option<&'a str>,
    pub status: Option<BookingStatus>,
}

pub fn list_bookings(
    conn: &Connection,
    filter: &BookingFilter,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE (?1 IS NULL OR student_id = ?1)
           AND (?2 IS NULL OR reader_id = ?2)
           AND (?3 IS NULL OR status = ?3)
         ORDER BY slot_start DESC
         LIMIT ?4"
    ))?;

    let rows = stmt.query_map(
        params![
            filter.student_id,
            filter.reader_id,
            filter.status.map(|s| s.as_str()),
            limit
        ],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let slot_start: String = row.get(5)?;
    let slot_end: String = row.get(6)?;
    let status: String = row.get(7)?;
    let cancelled_at: Option<String> = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Booking {
        id: row.get(0)?,
        student_id: row.get(1)?,
        reader_id: row.get(2)?,
        recitation_id: row.get(3)?,
        slot_id: row.get(4)?,
        slot_start: parse_ts(&slot_start)?,
        slot_end: parse_ts(&slot_end)?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status}"))?,
        meeting_link: row.get(8)?,
        notes: row.get(9)?,
        cancellation_reason: row.get(10)?,
        cancelled_by: row.get(11)?,
        cancelled_at: cancelled_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Reschedule Requests ──

const REQUEST_COLUMNS: &str = "id, booking_id, requested_by, requested_by_role, proposed_slot_start, proposed_slot_end, status, rejection_reason, superseded_by, created_at, updated_at";

pub fn insert_reschedule_request(
    conn: &Connection,
    request: &RescheduleRequest,
) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO booking_reschedule_requests ({REQUEST_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            request.id,
            request.booking_id,
            request.requested_by,
            request.requested_by_role.as_str(),
            fmt_ts(&request.proposed_slot_start),
            fmt_ts(&request.proposed_slot_end),
            request.status.as_str(),
            request.rejection_reason(),
            request.superseded_by(),
            fmt_ts(&request.created_at),
            fmt_ts(&request.updated_at),
        ],
    )?;
    Ok(())
}

/// Rejects every pending request on the booking in favour of `newer_id`.
pub fn supersede_pending_requests(
    conn: &Connection,
    booking_id: &str,
    newer_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE booking_reschedule_requests
         SET status = 'rejected', rejection_reason = ?1, superseded_by = ?2, updated_at = ?3
         WHERE booking_id = ?4 AND status = 'pending'",
        params![
            crate::models::reschedule::SUPERSEDED_REASON,
            newer_id,
            fmt_ts(now),
            booking_id
        ],
    )?;
    Ok(count)
}

pub fn update_reschedule_status(
    conn: &Connection,
    request: &RescheduleRequest,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_reschedule_requests
         SET status = ?1, rejection_reason = ?2, superseded_by = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            request.status.as_str(),
            request.rejection_reason(),
            request.superseded_by(),
            fmt_ts(&request.updated_at),
            request.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_reschedule_request(
    conn: &Connection,
    id: &str,
) -> anyhow::Result<Option<RescheduleRequest>> {
    let result = conn
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM booking_reschedule_requests WHERE id = ?1"),
            params![id],
            |row| Ok(parse_request_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn get_recent_reschedule_requests(
    conn: &Connection,
    booking_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<RescheduleRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM booking_reschedule_requests
         WHERE booking_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2"
    ))?;

    let rows = stmt.query_map(params![booking_id, limit], |row| {
        Ok(parse_request_row(row))
    })?;

    let mut requests = vec![];
    for row in rows {
        requests.push(row??);
    }
    Ok(requests)
}

fn parse_request_row(row: &rusqlite::Row) -> anyhow::Result<RescheduleRequest> {
    let role: String = row.get(3)?;
    let proposed_start: String = row.get(4)?;
    let proposed_end: String = row.get(5)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(RescheduleRequest {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        requested_by: row.get(2)?,
        requested_by_role: Role::parse(&role)
            .ok_or_else(|| anyhow::anyhow!("unknown requester role: {role}"))?,
        proposed_slot_start: parse_ts(&proposed_start)?,
        proposed_slot_end: parse_ts(&proposed_end)?,
        status: RescheduleStatus::from_columns(&status, row.get(7)?, row.get(8)?)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
