use chrono::NaiveDateTime;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::user::Role;

pub const SUPERSEDED_REASON: &str = "superseded";
pub const DEFAULT_REJECTION_REASON: &str = "Rejected by the other party";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Auto-rejected because a newer request was proposed on the same booking.
    Superseded { by: String },
    Declined(String),
}

impl Rejection {
    pub fn reason(&self) -> &str {
        match self {
            Rejection::Superseded { .. } => SUPERSEDED_REASON,
            Rejection::Declined(reason) => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleStatus {
    Pending,
    Accepted,
    Rejected(Rejection),
}

impl RescheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RescheduleStatus::Pending => "pending",
            RescheduleStatus::Accepted => "accepted",
            RescheduleStatus::Rejected(_) => "rejected",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RescheduleStatus::Pending)
    }

    /// Rebuilds the status from its stored columns.
    pub fn from_columns(
        status: &str,
        rejection_reason: Option<String>,
        superseded_by: Option<String>,
    ) -> anyhow::Result<Self> {
        match status {
            "pending" => Ok(RescheduleStatus::Pending),
            "accepted" => Ok(RescheduleStatus::Accepted),
            "rejected" => Ok(RescheduleStatus::Rejected(match superseded_by {
                Some(by) => Rejection::Superseded { by },
                None => Rejection::Declined(
                    rejection_reason.unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string()),
                ),
            })),
            other => Err(anyhow::anyhow!("unknown reschedule status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RescheduleRequest {
    pub id: String,
    pub booking_id: String,
    pub requested_by: String,
    pub requested_by_role: Role,
    pub proposed_slot_start: NaiveDateTime,
    pub proposed_slot_end: NaiveDateTime,
    pub status: RescheduleStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RescheduleRequest {
    pub fn rejection_reason(&self) -> Option<&str> {
        match &self.status {
            RescheduleStatus::Rejected(rejection) => Some(rejection.reason()),
            _ => None,
        }
    }

    pub fn superseded_by(&self) -> Option<&str> {
        match &self.status {
            RescheduleStatus::Rejected(Rejection::Superseded { by }) => Some(by),
            _ => None,
        }
    }
}

// Flattened for clients: `status` is the plain string and superseded requests
// still read `rejectionReason: "superseded"`.
impl Serialize for RescheduleRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RescheduleRequest", 10)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("bookingId", &self.booking_id)?;
        s.serialize_field("requestedBy", &self.requested_by)?;
        s.serialize_field("requestedByRole", &self.requested_by_role)?;
        s.serialize_field("proposedSlotStart", &self.proposed_slot_start)?;
        s.serialize_field("proposedSlotEnd", &self.proposed_slot_end)?;
        s.serialize_field("status", self.status.as_str())?;
        s.serialize_field("rejectionReason", &self.rejection_reason())?;
        s.serialize_field("supersededBy", &self.superseded_by())?;
        s.serialize_field("createdAt", &self.created_at)?;
        s.end()
    }
}
