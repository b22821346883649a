pub mod bookings;
pub mod record_log;
