use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::availability::overlaps;
use super::user::{CurrentUser, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub student_id: String,
    pub reader_id: String,
    pub recitation_id: Option<String>,
    pub slot_id: Option<String>,
    pub slot_start: NaiveDateTime,
    pub slot_end: NaiveDateTime,
    pub status: BookingStatus,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.student_id == user_id || self.reader_id == user_id
    }

    /// The seat `user` holds in this booking. Both the id and the role have to match it.
    pub fn side_of(&self, user: &CurrentUser) -> Option<Role> {
        match user.role {
            Role::Student if self.student_id == user.id => Some(Role::Student),
            Role::Reader if self.reader_id == user.id => Some(Role::Reader),
            _ => None,
        }
    }

    /// The other participant, if `user_id` is one of them.
    pub fn counterparty(&self, user_id: &str) -> Option<&str> {
        if self.student_id == user_id {
            Some(&self.reader_id)
        } else if self.reader_id == user_id {
            Some(&self.student_id)
        } else {
            None
        }
    }

    pub fn overlaps_window(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        overlaps(self.slot_start, self.slot_end, start, end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "no_show" => Some(BookingStatus::NoShow),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    /// Edges of the booking state machine. `Rescheduled` is never stored: accepting a
    /// reschedule request writes `Confirmed` directly.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
                | (Confirmed, Rescheduled)
                | (Rescheduled, Confirmed)
        )
    }
}

/// Statuses whose bookings must not overlap for the same reader.
pub const ACTIVE_STATUSES: [BookingStatus; 3] = [
    BookingStatus::Pending,
    BookingStatus::Confirmed,
    BookingStatus::Rescheduled,
];
