pub mod admin;
pub mod booking;
pub mod health;
pub mod property;
pub mod rating;
pub mod user;
