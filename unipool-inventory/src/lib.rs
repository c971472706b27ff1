pub mod ledger;
pub mod rides;

pub use ledger::{check_invariants, SeatLedger};
pub use rides::{RidePatch, RideService};
