use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use unipool_core::repository::{BookingRepository, RideRepository, UnitOfWork};
use unipool_core::{
    retry_on_conflict, Caller, CoreError, CoreResult, Gateway, NotBookableReason, Page,
    Transaction, UserIndex,
};
use unipool_inventory::SeatLedger;
use unipool_shared::{Booking, BookingStatus, Ride, RideStatus, SeatEvent, SeatEventKind};
use unipool_store::BookingRules;

use crate::state::{self, BookingActor, LedgerEffect};

/// Booking lifecycle on top of the seat ledger.
///
/// Every mutation writes the booking, the ride's seat bookkeeping and the
/// affected user index in one transaction. A version conflict re-runs the
/// whole read-validate-commit cycle.
pub struct BookingManager {
    gateway: Arc<dyn Gateway>,
    rules: BookingRules,
    events: Option<broadcast::Sender<SeatEvent>>,
}

impl BookingManager {
    pub fn new(gateway: Arc<dyn Gateway>, rules: BookingRules) -> Self {
        Self {
            gateway,
            rules,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<SeatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, ride: &Ride, booking_id: Uuid, kind: SeatEventKind) {
        if let Some(tx) = &self.events {
            let _ = tx.send(SeatEvent::new(ride.id, Some(booking_id), kind, ride.seats_available));
        }
    }

    /// Request seats on a ride. Seats are reserved immediately.
    pub async fn create(&self, caller: &Caller, ride_id: Uuid, seats: i32) -> CoreResult<Booking> {
        if seats < 1 {
            return Err(CoreError::InvalidSeatCount(seats));
        }
        if !caller.role.can_ride() {
            return Err(CoreError::Forbidden(format!("role {} cannot book rides", caller.role)));
        }

        retry_on_conflict(self.rules.max_conflict_retries, "booking creation", || {
            self.try_create(caller, ride_id, seats)
        })
        .await
    }

    async fn try_create(&self, caller: &Caller, ride_id: Uuid, seats: i32) -> CoreResult<Booking> {
        let mut ride = self.load_ride(ride_id).await?;
        let booking = Booking::new(ride.id, caller.user_id, seats);

        if let Err(e) = SeatLedger::new(&mut ride).reserve(booking.id, caller.user_id, seats) {
            warn!("Booking on ride {} refused: {}", ride_id, e);
            return Err(e);
        }

        let mut tx = Transaction::new();
        tx.insert_booking(booking.clone())
            .update_ride(ride.clone())
            .index_push(caller.user_id, UserIndex::Bookings, booking.id);
        self.gateway.commit(tx).await?;

        info!(
            "Booking {} reserved {} seats on ride {} ({} left)",
            booking.id, seats, ride.id, ride.seats_available
        );
        self.emit(&ride, booking.id, SeatEventKind::Reserved);
        Ok(booking)
    }

    /// Move a booking through the state machine on behalf of a participant
    pub async fn set_status(
        &self,
        booking_id: Uuid,
        requested: BookingStatus,
        caller: &Caller,
    ) -> CoreResult<Booking> {
        retry_on_conflict(self.rules.max_conflict_retries, "booking status change", || {
            self.try_set_status(booking_id, requested, caller)
        })
        .await
    }

    async fn try_set_status(
        &self,
        booking_id: Uuid,
        requested: BookingStatus,
        caller: &Caller,
    ) -> CoreResult<Booking> {
        let mut booking = self.load_booking(booking_id).await?;
        let mut ride = self.load_ride(booking.ride_id).await?;

        let actor = actor_for(&booking, &ride, caller)?;
        state::authorize(actor, requested)?;
        let effect = state::transition(booking.status, requested)?;

        if requested == BookingStatus::Accepted && ride.status != RideStatus::Pending {
            return Err(CoreError::RideNotBookable(NotBookableReason::Status(ride.status)));
        }

        let kind = match effect {
            LedgerEffect::Confirm => {
                if !SeatLedger::new(&mut ride).confirm(booking.id)? {
                    return Err(CoreError::CorruptRecord(format!(
                        "pending booking {} holds no seats on ride {}",
                        booking.id, ride.id
                    )));
                }
                Some(SeatEventKind::Confirmed)
            }
            LedgerEffect::Release => {
                SeatLedger::new(&mut ride).release(booking.id)?;
                Some(SeatEventKind::Released)
            }
            LedgerEffect::Nothing => None,
        };

        let from = booking.status;
        booking.update_status(requested);

        let mut tx = Transaction::new();
        tx.update_booking(booking.clone());
        if kind.is_some() {
            tx.update_ride(ride.clone());
        }
        self.gateway.commit(tx).await?;

        booking.version += 1;
        info!("Booking {} moved {} -> {} by {:?}", booking.id, from, requested, actor);
        if let Some(kind) = kind {
            self.emit(&ride, booking.id, kind);
        }
        Ok(booking)
    }

    /// Passenger-only hard delete. Open bookings give their seats back first.
    pub async fn delete(&self, booking_id: Uuid, caller: &Caller) -> CoreResult<()> {
        retry_on_conflict(self.rules.max_conflict_retries, "booking deletion", || {
            self.try_delete(booking_id, caller)
        })
        .await
    }

    async fn try_delete(&self, booking_id: Uuid, caller: &Caller) -> CoreResult<()> {
        let booking = self.load_booking(booking_id).await?;
        if booking.passenger_id != caller.user_id {
            return Err(CoreError::Forbidden(
                "only the passenger can delete a booking".to_string(),
            ));
        }

        let mut tx = Transaction::new();
        let mut released_from = None;
        if booking.status.is_open() {
            let mut ride = self.load_ride(booking.ride_id).await?;
            if SeatLedger::new(&mut ride).release(booking.id)? {
                tx.update_ride(ride.clone());
                released_from = Some(ride);
            }
        }
        tx.index_pull(booking.passenger_id, UserIndex::Bookings, booking.id)
            .delete_booking(&booking);
        self.gateway.commit(tx).await?;

        info!("Booking {} deleted by passenger", booking.id);
        if let Some(ride) = released_from {
            self.emit(&ride, booking.id, SeatEventKind::Released);
        }
        Ok(())
    }

    /// Visible to the passenger and the ride's driver
    pub async fn get(&self, booking_id: Uuid, caller: &Caller) -> CoreResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        if booking.passenger_id == caller.user_id {
            return Ok(booking);
        }
        let ride = self.load_ride(booking.ride_id).await?;
        actor_for(&booking, &ride, caller)?;
        Ok(booking)
    }

    pub async fn list_for_passenger(
        &self,
        passenger_id: Uuid,
        caller: &Caller,
        status: Option<BookingStatus>,
        page: Page,
    ) -> CoreResult<Vec<Booking>> {
        if passenger_id != caller.user_id {
            return Err(CoreError::Forbidden(
                "bookings are only listed for their passenger".to_string(),
            ));
        }
        Ok(self
            .gateway
            .list_bookings_by_passenger(passenger_id, status, page)
            .await?)
    }

    pub async fn list_for_ride(
        &self,
        ride_id: Uuid,
        caller: &Caller,
        status: Option<BookingStatus>,
        page: Page,
    ) -> CoreResult<Vec<Booking>> {
        let ride = self.load_ride(ride_id).await?;
        if ride.driver_id != caller.user_id {
            return Err(CoreError::Forbidden(
                "only the driver can list a ride's bookings".to_string(),
            ));
        }
        Ok(self.gateway.list_bookings_by_ride(ride_id, status, page).await?)
    }

    async fn load_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.gateway
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))
    }

    async fn load_ride(&self, ride_id: Uuid) -> CoreResult<Ride> {
        self.gateway
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ride", ride_id))
    }
}

fn actor_for(booking: &Booking, ride: &Ride, caller: &Caller) -> CoreResult<BookingActor> {
    if caller.user_id == ride.driver_id {
        Ok(BookingActor::Driver)
    } else if caller.user_id == booking.passenger_id {
        Ok(BookingActor::Passenger)
    } else {
        Err(CoreError::Forbidden(
            "caller is neither the driver nor the passenger".to_string(),
        ))
    }
}
