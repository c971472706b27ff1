use std::collections::HashSet;
use uuid::Uuid;

use unipool_core::{CoreError, CoreResult, NotBookableReason};
use unipool_shared::{Ride, SeatHold};

/// Seat bookkeeping for a single ride.
///
/// The ledger is the only code that writes `seats_available`, `passengers`
/// and `seat_holds`. It mutates the borrowed value and never persists; the
/// caller commits the ride in the same transaction as the booking write.
pub struct SeatLedger<'a> {
    ride: &'a mut Ride,
}

impl<'a> SeatLedger<'a> {
    pub fn new(ride: &'a mut Ride) -> Self {
        Self { ride }
    }

    /// Hold seats for a new booking
    pub fn reserve(&mut self, booking_id: Uuid, passenger_id: Uuid, seats: i32) -> CoreResult<()> {
        if seats < 1 {
            return Err(CoreError::InvalidSeatCount(seats));
        }
        if passenger_id == self.ride.driver_id {
            return Err(CoreError::RideNotBookable(NotBookableReason::SelfBookingForbidden));
        }
        if !self.ride.is_bookable() {
            return Err(CoreError::RideNotBookable(NotBookableReason::Status(self.ride.status)));
        }
        if self.ride.hold_for(booking_id).is_some() {
            return Err(CoreError::ValidationError(format!(
                "booking {} already holds seats on ride {}",
                booking_id, self.ride.id
            )));
        }
        if self.ride.seats_available < seats {
            return Err(CoreError::InsufficientCapacity {
                requested: seats,
                available: self.ride.seats_available,
            });
        }

        self.ride.seats_available -= seats;
        self.ride.seat_holds.push(SeatHold {
            booking_id,
            passenger_id,
            seats,
            confirmed: false,
        });
        if !self.ride.passengers.contains(&passenger_id) {
            self.ride.passengers.push(passenger_id);
        }
        self.ride.touch();

        check_invariants(self.ride)
    }

    /// Mark a booking's hold as accepted by the driver.
    ///
    /// Returns `false` when the booking holds nothing on this ride.
    pub fn confirm(&mut self, booking_id: Uuid) -> CoreResult<bool> {
        match self.ride.seat_holds.iter_mut().find(|h| h.booking_id == booking_id) {
            Some(hold) => {
                hold.confirmed = true;
                self.ride.touch();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Give a booking's seats back.
    ///
    /// Idempotent: a booking without a hold is a no-op returning `false`.
    pub fn release(&mut self, booking_id: Uuid) -> CoreResult<bool> {
        let Some(pos) = self
            .ride
            .seat_holds
            .iter()
            .position(|h| h.booking_id == booking_id)
        else {
            return Ok(false);
        };

        let hold = self.ride.seat_holds.remove(pos);
        self.ride.seats_available = (self.ride.seats_available + hold.seats).min(self.ride.total_seats);

        let still_riding = self
            .ride
            .seat_holds
            .iter()
            .any(|h| h.passenger_id == hold.passenger_id);
        if !still_riding {
            self.ride.passengers.retain(|p| *p != hold.passenger_id);
        }
        self.ride.touch();

        check_invariants(self.ride)?;
        Ok(true)
    }
}

/// Fails with `CorruptRecord` when the ride's seat bookkeeping disagrees with itself
pub fn check_invariants(ride: &Ride) -> CoreResult<()> {
    let corrupt = |reason: String| CoreError::CorruptRecord(format!("ride {}: {}", ride.id, reason));

    if ride.seats_available < 0 || ride.seats_available > ride.total_seats {
        return Err(corrupt(format!(
            "seats_available {} outside 0..={}",
            ride.seats_available, ride.total_seats
        )));
    }

    let held = ride.held_seats();
    if ride.seats_available != ride.total_seats - held {
        return Err(corrupt(format!(
            "seats_available {} but {} of {} seats are held",
            ride.seats_available, held, ride.total_seats
        )));
    }

    let mut seen = HashSet::new();
    if !ride.passengers.iter().all(|p| seen.insert(*p)) {
        return Err(corrupt("duplicate passenger entry".to_string()));
    }

    let holders: HashSet<Uuid> = ride.seat_holds.iter().map(|h| h.passenger_id).collect();
    if holders != seen {
        return Err(corrupt("passenger list does not match seat holds".to_string()));
    }

    Ok(())
}
