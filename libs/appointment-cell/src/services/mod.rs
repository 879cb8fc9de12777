pub mod appointments;
pub mod authorization;
pub mod availability;
pub mod conflict;
pub mod eligibility;
pub mod lifecycle;
pub mod locking;
pub mod notification;
pub mod reschedule;
pub mod store;
pub mod time;
pub mod validation;
