use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{AvailabilitySlot, SlotCandidate};

/// Outcome of trying to place one candidate among a reader's slots.
#[derive(Debug)]
pub(crate) enum Placement {
    Inserted(AvailabilitySlot),
    Blocked { by: String },
}

pub fn find_conflict<'a>(
    existing: &'a [AvailabilitySlot],
    candidate: &SlotCandidate,
) -> Option<&'a AvailabilitySlot> {
    existing.iter().find(|slot| slot.conflicts_with(candidate))
}

/// Checks `candidate` against `existing` and inserts it if clear. Inserted slots are
/// appended to `existing` so later candidates in the same transaction see them.
pub(crate) fn place(
    conn: &Connection,
    reader_id: &str,
    candidate: &SlotCandidate,
    existing: &mut Vec<AvailabilitySlot>,
) -> anyhow::Result<Placement> {
    if let Some(blocking) = find_conflict(existing, candidate) {
        return Ok(Placement::Blocked {
            by: blocking.id.clone(),
        });
    }

    let slot =
        AvailabilitySlot::from_candidate(uuid::Uuid::new_v4().to_string(), reader_id, candidate);
    queries::insert_slot(conn, &slot)?;
    existing.push(slot.clone());
    Ok(Placement::Inserted(slot))
}

pub fn add_slot(
    conn: &mut Connection,
    reader_id: &str,
    candidate: SlotCandidate,
) -> Result<AvailabilitySlot, AppError> {
    let tx = db::begin(conn)?;
    let mut existing = queries::get_slots_for_reader(&tx, reader_id)?;

    match place(&tx, reader_id, &candidate, &mut existing)? {
        Placement::Inserted(slot) => {
            tx.commit()?;
            tracing::info!(reader_id = %reader_id, slot_id = %slot.id, "availability slot added");
            Ok(slot)
        }
        Placement::Blocked { by } => {
            tracing::debug!(
                reader_id = %reader_id,
                conflicting_slot = %by,
                "slot rejected: overlap"
            );
            Err(AppError::conflict(
                "this time overlaps another slot in your schedule",
            ))
        }
    }
}

/// Deletes the reader's slot. Unknown or foreign ids are a no-op.
pub fn remove_slot(conn: &Connection, reader_id: &str, slot_id: &str) -> Result<(), AppError> {
    let removed = queries::delete_slot(conn, reader_id, slot_id)?;
    if removed {
        tracing::info!(reader_id = %reader_id, slot_id = %slot_id, "availability slot removed");
    }
    Ok(())
}

pub fn list_slots(conn: &Connection, reader_id: &str) -> Result<Vec<AvailabilitySlot>, AppError> {
    Ok(queries::get_slots_for_reader(conn, reader_id)?)
}

pub fn set_slot_available(
    conn: &Connection,
    reader_id: &str,
    slot_id: &str,
    available: bool,
) -> Result<AvailabilitySlot, AppError> {
    if !queries::set_slot_available(conn, reader_id, slot_id, available)? {
        return Err(AppError::not_found("slot not found"));
    }
    queries::get_slot(conn, slot_id)?.ok_or_else(|| AppError::not_found("slot not found"))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenSlot {
    #[serde(flatten)]
    pub slot: AvailabilitySlot,
    pub date: NaiveDate,
}

/// Bookable slots on `date`: available, applying to the date, and not overlapping an
/// active booking of the same reader.
pub fn open_slots_on(conn: &Connection, date: NaiveDate) -> Result<Vec<OpenSlot>, AppError> {
    let slots = queries::get_available_slots_on(conn, date)?;

    let day_start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::validation(format!("invalid date: {date}")))?;
    let day_end = day_start + Duration::days(1);
    let bookings = queries::get_active_bookings_in_range(conn, None, &day_start, &day_end)?;

    Ok(slots
        .into_iter()
        .filter(|slot| {
            let start = date.and_time(slot.start_time);
            let end = date.and_time(slot.end_time);
            !bookings
                .iter()
                .any(|b| b.reader_id == slot.reader_id && b.overlaps_window(start, end))
        })
        .map(|slot| OpenSlot { slot, date })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::availability::parse_time;
    use crate::models::{Booking, BookingStatus, SlotBasis, TimeWindow};

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn candidate(basis: SlotBasis, start: &str, end: &str) -> SlotCandidate {
        SlotCandidate {
            basis,
            window: TimeWindow::new(parse_time(start).unwrap(), parse_time(end).unwrap())
                .unwrap(),
        }
    }

    #[test]
    fn test_recurring_overlap_rejected_touching_accepted() {
        let mut conn = setup_db();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00")).unwrap();

        let overlapping =
            add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:30", "11:30"));
        assert!(matches!(overlapping, Err(AppError::Conflict(_))));

        let touching =
            add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "11:00", "12:00"));
        assert!(touching.is_ok());
        assert_eq!(list_slots(&conn, "reader-1").unwrap().len(), 2);
    }

    #[test]
    fn test_specific_date_checked_against_recurring() {
        let mut conn = setup_db();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00")).unwrap();

        // 2025-06-16 is a Monday, 2025-06-17 a Tuesday
        let monday = add_slot(
            &mut conn,
            "reader-1",
            candidate(SlotBasis::Date(d("2025-06-16")), "10:15", "10:45"),
        );
        assert!(matches!(monday, Err(AppError::Conflict(_))));

        let tuesday = add_slot(
            &mut conn,
            "reader-1",
            candidate(SlotBasis::Date(d("2025-06-17")), "10:15", "10:45"),
        );
        assert!(tuesday.is_ok());
    }

    #[test]
    fn test_recurring_checked_against_specific_date() {
        let mut conn = setup_db();
        add_slot(
            &mut conn,
            "reader-1",
            candidate(SlotBasis::Date(d("2025-06-16")), "09:00", "10:00"),
        )
        .unwrap();

        let result =
            add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "09:30", "10:30"));
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_readers_do_not_conflict_with_each_other() {
        let mut conn = setup_db();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00")).unwrap();
        assert!(
            add_slot(&mut conn, "reader-2", candidate(SlotBasis::Weekly(1), "10:00", "11:00"))
                .is_ok()
        );
    }

    #[test]
    fn test_list_order() {
        let mut conn = setup_db();
        // 2025-06-16 is a Monday
        add_slot(
            &mut conn,
            "reader-1",
            candidate(SlotBasis::Date(d("2025-06-16")), "08:00", "09:00"),
        )
        .unwrap();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "12:00", "13:00")).unwrap();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00")).unwrap();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(0), "15:00", "16:00")).unwrap();

        let slots = list_slots(&conn, "reader-1").unwrap();
        let order: Vec<_> = slots
            .iter()
            .map(|s| (s.day_of_week, s.specific_date, s.start_time.format("%H:%M").to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, None, "15:00".to_string()),
                (1, None, "10:00".to_string()),
                (1, None, "12:00".to_string()),
                (1, Some(d("2025-06-16")), "08:00".to_string()),
            ]
        );
    }

    #[test]
    fn test_remove_is_owner_scoped_and_idempotent() {
        let mut conn = setup_db();
        let slot =
            add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(2), "10:00", "11:00"))
                .unwrap();

        remove_slot(&conn, "reader-2", &slot.id).unwrap();
        assert_eq!(list_slots(&conn, "reader-1").unwrap().len(), 1);

        remove_slot(&conn, "reader-1", &slot.id).unwrap();
        remove_slot(&conn, "reader-1", &slot.id).unwrap();
        assert!(list_slots(&conn, "reader-1").unwrap().is_empty());
    }

    #[test]
    fn test_soft_disable() {
        let mut conn = setup_db();
        let slot =
            add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00"))
                .unwrap();

        let disabled = set_slot_available(&conn, "reader-1", &slot.id, false).unwrap();
        assert!(!disabled.is_available);
        assert!(open_slots_on(&conn, d("2025-06-16")).unwrap().is_empty());

        // A disabled slot still occupies its window.
        let again =
            add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00"));
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let foreign = set_slot_available(&conn, "reader-2", &slot.id, true);
        assert!(matches!(foreign, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_open_slots_hide_booked_windows() {
        let mut conn = setup_db();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "10:00", "11:00")).unwrap();
        add_slot(&mut conn, "reader-1", candidate(SlotBasis::Weekly(1), "11:00", "12:00")).unwrap();
        add_slot(&mut conn, "reader-2", candidate(SlotBasis::Weekly(1), "10:00", "11:00")).unwrap();

        let monday = d("2025-06-16");
        assert_eq!(open_slots_on(&conn, monday).unwrap().len(), 3);

        let ts = |t: &str| monday.and_time(parse_time(t).unwrap());
        let now = ts("08:00");
        queries::insert_booking(
            &conn,
            &Booking {
                id: "b1".to_string(),
                student_id: "student-1".to_string(),
                reader_id: "reader-1".to_string(),
                recitation_id: None,
                slot_id: None,
                slot_start: ts("10:00"),
                slot_end: ts("11:00"),
                status: BookingStatus::Confirmed,
                meeting_link: None,
                notes: None,
                cancellation_reason: None,
                cancelled_by: None,
                cancelled_at: None,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();

        let open = open_slots_on(&conn, monday).unwrap();
        let summary: Vec<_> = open
            .iter()
            .map(|o| (o.slot.reader_id.as_str(), o.slot.start_time.format("%H:%M").to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![("reader-2", "10:00".to_string()), ("reader-1", "11:00".to_string())]
        );
    }
}
