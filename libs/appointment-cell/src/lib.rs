pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

pub use models::{Appointment, AppointmentError, AppointmentStatus};
pub use router::appointment_routes;
pub use state::AppointmentState;
