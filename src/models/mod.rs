pub mod availability;
pub mod booking;
pub mod notification;
pub mod reschedule;
pub mod user;

pub use availability::{AvailabilitySlot, SlotBasis, SlotCandidate, TimeWindow};
pub use booking::{Booking, BookingStatus};
pub use notification::{Notification, NotificationKind};
pub use reschedule::{Rejection, RescheduleRequest, RescheduleStatus};
pub use user::{CurrentUser, Role};
