pub mod booking;
pub mod events;
pub mod rating;
pub mod ride;
pub mod user;
