use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` overlap iff `s1 < e2 && e1 > s2`.
/// Touching boundaries (`e1 == s2`) do not overlap.
pub fn overlaps<T: PartialOrd>(s1: T, e1: T, s2: T, e2: T) -> bool {
    s1 < e2 && e1 > s2
}

/// Weekday index with Sunday = 0, matching `dayOfWeek` on the wire.
pub fn day_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl TimeWindow {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Result<Self, AppError> {
        if start_time >= end_time {
            return Err(AppError::validation(format!(
                "start time {} must be before end time {}",
                start_time.format("%H:%M"),
                end_time.format("%H:%M")
            )));
        }
        Ok(Self {
            start_time,
            end_time,
        })
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        overlaps(
            self.start_time,
            self.end_time,
            other.start_time,
            other.end_time,
        )
    }
}

/// The calendar dates a slot applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBasis {
    Weekly(u8),
    Date(NaiveDate),
}

impl SlotBasis {
    pub fn weekly(day_of_week: u8) -> Result<Self, AppError> {
        if day_of_week > 6 {
            return Err(AppError::validation(format!(
                "invalid day of week: {day_of_week}"
            )));
        }
        Ok(SlotBasis::Weekly(day_of_week))
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self {
            SlotBasis::Weekly(day) => *day == day_index(date),
            SlotBasis::Date(d) => *d == date,
        }
    }

    /// Whether some calendar date exists that both bases apply to.
    pub fn shares_date_with(&self, other: &SlotBasis) -> bool {
        match (self, other) {
            (SlotBasis::Weekly(a), SlotBasis::Weekly(b)) => a == b,
            (SlotBasis::Date(d), basis) | (basis, SlotBasis::Date(d)) => basis.applies_to(*d),
        }
    }

    pub fn day_of_week(&self) -> u8 {
        match self {
            SlotBasis::Weekly(day) => *day,
            SlotBasis::Date(d) => day_index(*d),
        }
    }

    pub fn specific_date(&self) -> Option<NaiveDate> {
        match self {
            SlotBasis::Weekly(_) => None,
            SlotBasis::Date(d) => Some(*d),
        }
    }
}

/// A slot that has not been stored yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCandidate {
    pub basis: SlotBasis,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub id: String,
    pub reader_id: String,
    pub day_of_week: u8,
    pub specific_date: Option<NaiveDate>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub is_recurring: bool,
    pub is_available: bool,
}

impl AvailabilitySlot {
    pub fn from_candidate(id: String, reader_id: &str, candidate: &SlotCandidate) -> Self {
        Self {
            id,
            reader_id: reader_id.to_string(),
            day_of_week: candidate.basis.day_of_week(),
            specific_date: candidate.basis.specific_date(),
            start_time: candidate.window.start_time,
            end_time: candidate.window.end_time,
            is_recurring: matches!(candidate.basis, SlotBasis::Weekly(_)),
            is_available: true,
        }
    }

    pub fn basis(&self) -> SlotBasis {
        match (self.is_recurring, self.specific_date) {
            (false, Some(date)) => SlotBasis::Date(date),
            _ => SlotBasis::Weekly(self.day_of_week),
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.basis().applies_to(date)
    }

    pub fn conflicts_with(&self, candidate: &SlotCandidate) -> bool {
        self.basis().shares_date_with(&candidate.basis) && self.window().overlaps(&candidate.window)
    }
}

/// Slot times are whole minutes; `HH:MM:SS` is accepted only with zero seconds.
pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let t = NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| anyhow::anyhow!("invalid time format: {s}"))?;
    if t.second() != 0 || t.nanosecond() != 0 {
        anyhow::bail!("time must be a whole minute: {s}");
    }
    Ok(t)
}

pub fn format_time(t: &NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// `HH:MM` on the wire; `HH:MM:00` is accepted on input.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(t(start), t(end)).unwrap()
    }

    fn slot(basis: SlotBasis, start: &str, end: &str) -> AvailabilitySlot {
        let candidate = SlotCandidate {
            basis,
            window: window(start, end),
        };
        AvailabilitySlot::from_candidate("s1".to_string(), "reader-1", &candidate)
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let pairs = [
            (("09:00", "10:00"), ("09:30", "10:30")),
            (("09:00", "12:00"), ("10:00", "11:00")),
            (("09:00", "10:00"), ("10:00", "11:00")),
            (("09:00", "10:00"), ("13:00", "14:00")),
        ];
        for ((a1, a2), (b1, b2)) in pairs {
            assert_eq!(
                overlaps(t(a1), t(a2), t(b1), t(b2)),
                overlaps(t(b1), t(b2), t(a1), t(a2)),
                "{a1}-{a2} vs {b1}-{b2}"
            );
        }
    }

    #[test]
    fn test_touching_boundaries_do_not_overlap() {
        assert!(!overlaps(t("10:00"), t("11:00"), t("11:00"), t("12:00")));
        assert!(!overlaps(t("11:00"), t("12:00"), t("10:00"), t("11:00")));
        assert!(overlaps(t("10:00"), t("11:01"), t("11:00"), t("12:00")));
    }

    #[test]
    fn test_containment_overlaps() {
        assert!(window("09:00", "17:00").overlaps(&window("12:00", "13:00")));
        assert!(window("12:00", "13:00").overlaps(&window("09:00", "17:00")));
    }

    #[test]
    fn test_window_requires_start_before_end() {
        assert!(TimeWindow::new(t("10:00"), t("10:00")).is_err());
        assert!(TimeWindow::new(t("11:00"), t("10:00")).is_err());
    }

    #[test]
    fn test_weekly_basis_validates_day() {
        assert!(SlotBasis::weekly(6).is_ok());
        assert!(SlotBasis::weekly(7).is_err());
    }

    #[test]
    fn test_applies_to() {
        // 2025-06-16 is a Monday
        let monday = d("2025-06-16");
        assert!(SlotBasis::Weekly(1).applies_to(monday));
        assert!(!SlotBasis::Weekly(2).applies_to(monday));
        assert!(SlotBasis::Date(monday).applies_to(monday));
        assert!(!SlotBasis::Date(d("2025-06-23")).applies_to(monday));
    }

    #[test]
    fn test_shares_date_with() {
        let monday = d("2025-06-16");
        let tuesday = d("2025-06-17");
        assert!(SlotBasis::Weekly(1).shares_date_with(&SlotBasis::Weekly(1)));
        assert!(!SlotBasis::Weekly(1).shares_date_with(&SlotBasis::Weekly(2)));
        assert!(SlotBasis::Weekly(1).shares_date_with(&SlotBasis::Date(monday)));
        assert!(SlotBasis::Date(monday).shares_date_with(&SlotBasis::Weekly(1)));
        assert!(!SlotBasis::Date(tuesday).shares_date_with(&SlotBasis::Weekly(1)));
        assert!(!SlotBasis::Date(monday).shares_date_with(&SlotBasis::Date(tuesday)));
    }

    #[test]
    fn test_slot_conflicts_with_candidate() {
        let existing = slot(SlotBasis::Weekly(1), "10:00", "11:00");
        let on_monday = SlotCandidate {
            basis: SlotBasis::Date(d("2025-06-16")),
            window: window("10:30", "11:30"),
        };
        let on_tuesday = SlotCandidate {
            basis: SlotBasis::Date(d("2025-06-17")),
            window: window("10:30", "11:30"),
        };
        let after = SlotCandidate {
            basis: SlotBasis::Weekly(1),
            window: window("11:00", "12:00"),
        };
        assert!(existing.conflicts_with(&on_monday));
        assert!(!existing.conflicts_with(&on_tuesday));
        assert!(!existing.conflicts_with(&after));
    }

    #[test]
    fn test_specific_date_slot_carries_weekday() {
        let s = slot(SlotBasis::Date(d("2025-06-15")), "09:00", "10:00");
        assert_eq!(s.day_of_week, 0);
        assert!(!s.is_recurring);
        assert_eq!(s.basis(), SlotBasis::Date(d("2025-06-15")));
    }

    #[test]
    fn test_wire_format() {
        let s = slot(SlotBasis::Weekly(3), "09:00", "10:30");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["startTime"], "09:00");
        assert_eq!(json["endTime"], "10:30");
        assert_eq!(json["dayOfWeek"], 3);
        assert!(json["specificDate"].is_null());

        let w: TimeWindow =
            serde_json::from_str(r#"{"startTime":"09:00:00","endTime":"09:45"}"#).unwrap();
        assert_eq!(w.start_time, t("09:00"));
        assert_eq!(w.end_time, t("09:45"));
    }

    #[test]
    fn test_parse_invalid_time() {
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("nine").is_err());
    }

    #[test]
    fn test_seconds_must_be_zero() {
        assert_eq!(parse_time("09:00:00").unwrap(), t("09:00"));
        assert!(parse_time("09:00:10").is_err());
        assert!(parse_time("23:59:60").is_err());

        let err = serde_json::from_str::<TimeWindow>(
            r#"{"startTime":"09:00:10","endTime":"09:00:50"}"#,
        );
        assert!(err.is_err());
    }
}
