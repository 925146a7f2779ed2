use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionBooked,
    BookingConfirmed,
    BookingCancelled,
    BookingReassigned,
    MeetingLink,
    RescheduleRequest,
    RescheduleAccepted,
    RescheduleRejected,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
    pub related_booking_id: Option<String>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            link: link.into(),
            related_booking_id: None,
        }
    }

    pub fn for_booking(mut self, booking_id: impl Into<String>) -> Self {
        self.related_booking_id = Some(booking_id.into());
        self
    }
}
