pub mod booking;
pub mod property;
pub mod rating;
pub mod user;
