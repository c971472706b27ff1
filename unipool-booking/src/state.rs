use serde::{Deserialize, Serialize};
use unipool_core::{CoreError, CoreResult};
use unipool_shared::BookingStatus;

/// Who is asking for a booking transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingActor {
    Driver,
    Passenger,
}

/// What the seat ledger must do alongside a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Seats were reserved at creation; mark them accepted
    Confirm,
    Release,
    Nothing,
}

/// Passengers may only cancel; drivers may only accept or reject.
/// Completion is driven by the ride, never requested directly.
pub fn authorize(actor: BookingActor, requested: BookingStatus) -> CoreResult<()> {
    let allowed = match actor {
        BookingActor::Passenger => requested == BookingStatus::Cancelled,
        BookingActor::Driver => matches!(requested, BookingStatus::Accepted | BookingStatus::Rejected),
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "{:?} cannot move a booking to {}",
            actor, requested
        )))
    }
}

/// Transition table
pub fn transition(from: BookingStatus, to: BookingStatus) -> CoreResult<LedgerEffect> {
    use BookingStatus::*;

    match (from, to) {
        (Pending, Accepted) => Ok(LedgerEffect::Confirm),
        (Pending, Rejected) => Ok(LedgerEffect::Release),
        (Pending, Cancelled) | (Accepted, Cancelled) => Ok(LedgerEffect::Release),
        (Accepted, Completed) => Ok(LedgerEffect::Nothing),
        _ => Err(CoreError::invalid_transition(from, to)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [BookingStatus::Rejected, BookingStatus::Cancelled, BookingStatus::Completed] {
            for to in [
                BookingStatus::Pending,
                BookingStatus::Accepted,
                BookingStatus::Rejected,
                BookingStatus::Cancelled,
                BookingStatus::Completed,
            ] {
                assert!(matches!(
                    transition(from, to),
                    Err(CoreError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn test_ledger_effects() {
        assert_eq!(
            transition(BookingStatus::Pending, BookingStatus::Accepted).unwrap(),
            LedgerEffect::Confirm
        );
        assert_eq!(
            transition(BookingStatus::Accepted, BookingStatus::Cancelled).unwrap(),
            LedgerEffect::Release
        );
        assert!(transition(BookingStatus::Accepted, BookingStatus::Rejected).is_err());
        assert!(transition(BookingStatus::Pending, BookingStatus::Completed).is_err());
    }

    #[test]
    fn test_actor_permissions() {
        assert!(authorize(BookingActor::Passenger, BookingStatus::Cancelled).is_ok());
        assert!(authorize(BookingActor::Passenger, BookingStatus::Accepted).is_err());
        assert!(authorize(BookingActor::Driver, BookingStatus::Rejected).is_ok());
        assert!(authorize(BookingActor::Driver, BookingStatus::Cancelled).is_err());
        assert!(authorize(BookingActor::Driver, BookingStatus::Completed).is_err());
    }
}
