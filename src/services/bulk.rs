use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::availability::day_index;
use crate::models::{SlotBasis, SlotCandidate, TimeWindow};
use crate::services::availability::{place, Placement};

const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub times: Vec<TimeWindow>,
    #[serde(default)]
    pub days: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSlot {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub window: TimeWindow,
    pub conflicts_with: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub skipped_details: Vec<SkippedSlot>,
}

impl BulkRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.times.is_empty() {
            return Err(AppError::validation("at least one time window is required"));
        }
        for w in &self.times {
            TimeWindow::new(w.start_time, w.end_time)?;
        }
        if self.start_date > self.end_date {
            return Err(AppError::validation("start date must not be after end date"));
        }
        if (self.end_date - self.start_date).num_days() >= MAX_RANGE_DAYS {
            return Err(AppError::validation(format!(
                "date range may span at most {MAX_RANGE_DAYS} days"
            )));
        }
        if let Some(day) = self.days.iter().flatten().find(|d| **d > 6) {
            return Err(AppError::validation(format!("invalid day of week: {day}")));
        }
        Ok(())
    }

    fn allows(&self, date: NaiveDate) -> bool {
        match &self.days {
            Some(days) if !days.is_empty() => days.contains(&day_index(date)),
            _ => true,
        }
    }

    /// Specific-date candidates in date order, then window order within a date.
    pub fn candidates(&self) -> Vec<SlotCandidate> {
        self.start_date
            .iter_days()
            .take_while(|date| *date <= self.end_date)
            .filter(|date| self.allows(*date))
            .flat_map(|date| {
                self.times.iter().map(move |window| SlotCandidate {
                    basis: SlotBasis::Date(date),
                    window: *window,
                })
            })
            .collect()
    }
}

/// Inserts every candidate that does not overlap the reader's schedule, in order, inside
/// one transaction. Fails as a whole only if nothing could be inserted.
pub fn generate(
    conn: &mut Connection,
    reader_id: &str,
    req: &BulkRequest,
) -> Result<BulkSummary, AppError> {
    req.validate()?;

    let candidates = req.candidates();
    if candidates.is_empty() {
        return Err(AppError::validation("no matching days in the selected range"));
    }

    let tx = db::begin(conn)?;
    let mut existing = queries::get_slots_for_reader(&tx, reader_id)?;

    let mut summary = BulkSummary {
        inserted: 0,
        skipped: 0,
        skipped_details: vec![],
    };

    for candidate in &candidates {
        match place(&tx, reader_id, candidate, &mut existing)? {
            Placement::Inserted(_) => summary.inserted += 1,
            Placement::Blocked { by } => {
                summary.skipped += 1;
                summary.skipped_details.push(SkippedSlot {
                    date: candidate.basis.specific_date().unwrap_or(req.start_date),
                    window: candidate.window,
                    conflicts_with: by,
                });
            }
        }
    }

    if summary.inserted == 0 {
        return Err(AppError::conflict(format!(
            "all {} requested slots conflict with existing slots",
            summary.skipped
        )));
    }

    tx.commit()?;

    tracing::info!(
        reader_id = %reader_id,
        inserted = summary.inserted,
        skipped = summary.skipped,
        "bulk slots generated"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::availability::parse_time;
    use crate::services::availability::{add_slot, list_slots};

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn w(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(parse_time(start).unwrap(), parse_time(end).unwrap()).unwrap()
    }

    fn request(
        start: &str,
        end: &str,
        times: Vec<TimeWindow>,
        days: Option<Vec<u8>>,
    ) -> BulkRequest {
        BulkRequest {
            start_date: d(start),
            end_date: d(end),
            times,
            days,
        }
    }

    #[test]
    fn test_single_monday_in_range() {
        let mut conn = setup_db();
        // 2024-01-01 is a Monday; so is 2024-01-08, just past the range
        let req = request("2024-01-02", "2024-01-07", vec![w("09:00", "10:00")], Some(vec![1]));
        assert!(matches!(
            generate(&mut conn, "reader-1", &req),
            Err(AppError::Validation(_))
        ));

        // 2025-01-06 is the only Monday between Jan 1 and Jan 7, 2025
        let req = request("2025-01-01", "2025-01-07", vec![w("09:00", "10:00")], Some(vec![1]));
        let summary = generate(&mut conn, "reader-1", &req).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 0);

        let slots = list_slots(&conn, "reader-1").unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].specific_date, Some(d("2025-01-06")));
        assert_eq!(slots[0].day_of_week, 1);
        assert!(!slots[0].is_recurring);
    }

    #[test]
    fn test_empty_days_means_every_day() {
        let mut conn = setup_db();
        let req = request(
            "2025-01-01",
            "2025-01-07",
            vec![w("09:00", "10:00"), w("14:00", "15:00")],
            Some(vec![]),
        );
        let summary = generate(&mut conn, "reader-1", &req).unwrap();
        assert_eq!(summary.inserted, 14);
    }

    #[test]
    fn test_repeating_a_batch_skips_everything() {
        let mut conn = setup_db();
        let req = request("2025-01-01", "2025-01-03", vec![w("09:00", "10:00")], None);
        assert_eq!(generate(&mut conn, "reader-1", &req).unwrap().inserted, 3);

        match generate(&mut conn, "reader-1", &req) {
            Err(AppError::Conflict(msg)) => assert!(msg.contains("all 3"), "{msg}"),
            other => panic!("expected whole-batch conflict, got {other:?}"),
        }
        assert_eq!(list_slots(&conn, "reader-1").unwrap().len(), 3);
    }

    #[test]
    fn test_partial_conflicts_are_skipped() {
        let mut conn = setup_db();
        // Recurring Wednesday 09:30-10:30 blocks 2025-01-01 (a Wednesday)
        add_slot(
            &mut conn,
            "reader-1",
            SlotCandidate {
                basis: SlotBasis::Weekly(3),
                window: w("09:30", "10:30"),
            },
        )
        .unwrap();

        let req = request("2025-01-01", "2025-01-02", vec![w("09:00", "10:00")], None);
        let summary = generate(&mut conn, "reader-1", &req).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.skipped_details[0].date, d("2025-01-01"));
    }

    #[test]
    fn test_overlapping_windows_within_one_batch() {
        let mut conn = setup_db();
        let req = request(
            "2025-01-01",
            "2025-01-01",
            vec![w("09:00", "10:00"), w("09:30", "10:30"), w("10:00", "11:00")],
            None,
        );
        let summary = generate(&mut conn, "reader-1", &req).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.skipped_details[0].window, w("09:30", "10:30"));
    }

    #[test]
    fn test_validation_happens_before_any_insert() {
        let mut conn = setup_db();

        let empty = request("2025-01-01", "2025-01-07", vec![], None);
        assert!(matches!(generate(&mut conn, "r", &empty), Err(AppError::Validation(_))));

        let reversed = request("2025-01-07", "2025-01-01", vec![w("09:00", "10:00")], None);
        assert!(matches!(generate(&mut conn, "r", &reversed), Err(AppError::Validation(_))));

        let bad_window = BulkRequest {
            times: vec![TimeWindow {
                start_time: parse_time("10:00").unwrap(),
                end_time: parse_time("09:00").unwrap(),
            }],
            ..request("2025-01-01", "2025-01-07", vec![], None)
        };
        assert!(matches!(generate(&mut conn, "r", &bad_window), Err(AppError::Validation(_))));

        let bad_day = request("2025-01-01", "2025-01-07", vec![w("09:00", "10:00")], Some(vec![7]));
        assert!(matches!(generate(&mut conn, "r", &bad_day), Err(AppError::Validation(_))));

        let too_long = request("2025-01-01", "2026-06-01", vec![w("09:00", "10:00")], None);
        assert!(matches!(generate(&mut conn, "r", &too_long), Err(AppError::Validation(_))));

        assert!(list_slots(&conn, "r").unwrap().is_empty());
    }

    #[test]
    fn test_request_deserializes_from_client_json() {
        let req: BulkRequest = serde_json::from_str(
            r#"{"startDate":"2025-01-01","endDate":"2025-01-07","times":[{"startTime":"09:00","endTime":"10:00"}],"days":[1,3]}"#,
        )
        .unwrap();
        assert_eq!(req.days, Some(vec![1, 3]));
        // Jan 1 is a Wednesday, Jan 6 a Monday
        assert_eq!(req.candidates().len(), 2);
    }
}
