pub mod state;
pub mod manager;

pub use state::{BookingActor, LedgerEffect};
pub use manager::BookingManager;
