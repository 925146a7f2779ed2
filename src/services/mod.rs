pub mod availability;
pub mod bulk;
pub mod ledger;
pub mod notify;
pub mod reschedule;
