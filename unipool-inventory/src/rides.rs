use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use unipool_core::repository::{BookingRepository, RideRepository, UnitOfWork};
use unipool_core::{
    retry_on_conflict, Caller, CoreError, CoreResult, Gateway, Page, RideQuery, Transaction,
    UserIndex,
};
use unipool_shared::{
    BookingStatus, Ride, RideDraft, RideStatus, SeatEvent, SeatEventKind,
};
use unipool_store::BookingRules;

use crate::ledger::SeatLedger;

/// Driver-editable ride fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RidePatch {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub description: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,
    pub price_cents: Option<i32>,
}

/// Ride publication and lifecycle.
///
/// Start, complete and cancel cascade to the ride's bookings in the same
/// transaction as the ride write.
pub struct RideService {
    gateway: Arc<dyn Gateway>,
    rules: BookingRules,
    events: Option<broadcast::Sender<SeatEvent>>,
}

impl RideService {
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

    fn emit(&self, event: SeatEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }

    pub async fn publish(&self, caller: &Caller, draft: RideDraft) -> CoreResult<Ride> {
        if !caller.role.can_drive() {
            return Err(CoreError::Forbidden(format!(
                "role {} cannot publish rides",
                caller.role
            )));
        }
        if draft.total_seats < 1 {
            return Err(CoreError::InvalidSeatCount(draft.total_seats));
        }
        validate_places(&draft.origin, &draft.destination)?;
        validate_price(draft.price_cents)?;

        let ride = Ride::new(caller.user_id, draft);

        let mut tx = Transaction::new();
        tx.insert_ride(ride.clone())
            .index_push(caller.user_id, UserIndex::RidesOffered, ride.id);
        self.gateway.commit(tx).await?;

        info!(
            "Ride {} published by {}: {} -> {} ({} seats)",
            ride.id, ride.driver_id, ride.origin, ride.destination, ride.total_seats
        );
        Ok(ride)
    }

    pub async fn get(&self, ride_id: Uuid) -> CoreResult<Ride> {
        self.gateway
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ride", ride_id))
    }

    /// Pending rides matching the query
    pub async fn search(&self, query: &RideQuery) -> CoreResult<Vec<Ride>> {
        Ok(self.gateway.search_rides(query).await?)
    }

    pub async fn list_for_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
        page: Page,
    ) -> CoreResult<Vec<Ride>> {
        Ok(self.gateway.list_rides_by_driver(driver_id, status, page).await?)
    }

    /// Edit a pending ride. Seat counts are not editable.
    pub async fn update(&self, ride_id: Uuid, caller: &Caller, patch: RidePatch) -> CoreResult<Ride> {
        if let Some(price) = patch.price_cents {
            validate_price(price)?;
        }

        retry_on_conflict(self.rules.max_conflict_retries, "ride update", || {
            self.try_update(ride_id, caller, patch.clone())
        })
        .await
    }

    async fn try_update(&self, ride_id: Uuid, caller: &Caller, patch: RidePatch) -> CoreResult<Ride> {
        let mut ride = self.owned_ride(ride_id, caller).await?;
        if ride.status != RideStatus::Pending {
            return Err(CoreError::ValidationError(format!(
                "ride is {}; only pending rides can be edited",
                ride.status
            )));
        }

        if let Some(origin) = patch.origin {
            ride.origin = origin;
        }
        if let Some(destination) = patch.destination {
            ride.destination = destination;
        }
        if let Some(description) = patch.description {
            ride.description = Some(description);
        }
        if let Some(departure_time) = patch.departure_time {
            ride.departure_time = departure_time;
        }
        if let Some(price) = patch.price_cents {
            ride.price_cents = price;
        }
        validate_places(&ride.origin, &ride.destination)?;
        ride.touch();

        let mut tx = Transaction::new();
        tx.update_ride(ride.clone());
        self.gateway.commit(tx).await?;

        ride.version += 1;
        info!("Ride {} updated by driver", ride.id);
        Ok(ride)
    }

    /// Pending -> InProgress
    pub async fn start(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        retry_on_conflict(self.rules.max_conflict_retries, "ride start", || {
            self.try_start(ride_id, caller)
        })
        .await
    }

    async fn try_start(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        let mut ride = self.owned_ride(ride_id, caller).await?;
        if ride.status != RideStatus::Pending {
            return Err(CoreError::invalid_transition(ride.status, RideStatus::InProgress));
        }

        ride.status = RideStatus::InProgress;
        ride.touch();

        let mut tx = Transaction::new();
        tx.update_ride(ride.clone());
        self.gateway.commit(tx).await?;

        ride.version += 1;
        info!("Ride {} started", ride.id);
        self.emit(SeatEvent::new(ride.id, None, SeatEventKind::RideStarted, ride.seats_available));
        Ok(ride)
    }

    /// InProgress -> Completed. Accepted bookings complete; pending ones are
    /// rejected and their seats released.
    pub async fn complete(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        retry_on_conflict(self.rules.max_conflict_retries, "ride completion", || {
            self.try_complete(ride_id, caller)
        })
        .await
    }

    async fn try_complete(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        let mut ride = self.owned_ride(ride_id, caller).await?;
        if ride.status != RideStatus::InProgress {
            return Err(CoreError::invalid_transition(ride.status, RideStatus::Completed));
        }

        let bookings = self
            .gateway
            .list_bookings_by_ride(ride.id, None, Page::unbounded())
            .await?;

        let mut tx = Transaction::new();
        let mut released = Vec::new();
        {
            let mut ledger = SeatLedger::new(&mut ride);
            for mut booking in bookings {
                match booking.status {
                    BookingStatus::Accepted => {
                        booking.update_status(BookingStatus::Completed);
                        tx.update_booking(booking);
                    }
                    BookingStatus::Pending => {
                        if ledger.release(booking.id)? {
                            released.push(booking.id);
                        }
                        booking.update_status(BookingStatus::Rejected);
                        tx.update_booking(booking);
                    }
                    _ => {}
                }
            }
        }

        ride.status = RideStatus::Completed;
        ride.touch();
        tx.update_ride(ride.clone());
        self.gateway.commit(tx).await?;

        ride.version += 1;
        info!("Ride {} completed; {} pending bookings rejected", ride.id, released.len());
        for booking_id in released {
            self.emit(SeatEvent::new(ride.id, Some(booking_id), SeatEventKind::Released, ride.seats_available));
        }
        self.emit(SeatEvent::new(ride.id, None, SeatEventKind::RideCompleted, ride.seats_available));
        Ok(ride)
    }

    /// Soft delete: the ride and every open booking become Cancelled
    pub async fn cancel(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        retry_on_conflict(self.rules.max_conflict_retries, "ride cancellation", || {
            self.try_cancel(ride_id, caller)
        })
        .await
    }

    async fn try_cancel(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        let mut ride = self.owned_ride(ride_id, caller).await?;
        if !matches!(ride.status, RideStatus::Pending | RideStatus::InProgress) {
            return Err(CoreError::invalid_transition(ride.status, RideStatus::Cancelled));
        }

        let bookings = self
            .gateway
            .list_bookings_by_ride(ride.id, None, Page::unbounded())
            .await?;

        let mut tx = Transaction::new();
        let mut released = Vec::new();
        {
            let mut ledger = SeatLedger::new(&mut ride);
            for mut booking in bookings.into_iter().filter(|b| b.status.is_open()) {
                if ledger.release(booking.id)? {
                    released.push(booking.id);
                }
                booking.update_status(BookingStatus::Cancelled);
                tx.update_booking(booking);
            }
        }

        ride.status = RideStatus::Cancelled;
        ride.touch();
        tx.update_ride(ride.clone());
        self.gateway.commit(tx).await?;

        ride.version += 1;
        info!("Ride {} cancelled; {} bookings released", ride.id, released.len());
        for booking_id in released {
            self.emit(SeatEvent::new(ride.id, Some(booking_id), SeatEventKind::Released, ride.seats_available));
        }
        self.emit(SeatEvent::new(ride.id, None, SeatEventKind::RideCancelled, ride.seats_available));
        Ok(ride)
    }

    async fn owned_ride(&self, ride_id: Uuid, caller: &Caller) -> CoreResult<Ride> {
        let ride = self.get(ride_id).await?;
        if ride.driver_id != caller.user_id {
            return Err(CoreError::Forbidden("only the driver can manage this ride".to_string()));
        }
        Ok(ride)
    }
}

fn validate_places(origin: &str, destination: &str) -> CoreResult<()> {
    if origin.trim().is_empty() || destination.trim().is_empty() {
        return Err(CoreError::ValidationError(
            "origin and destination are required".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price_cents: i32) -> CoreResult<()> {
    if price_cents < 0 {
        return Err(CoreError::ValidationError(format!(
            "price must not be negative, got {} cents",
            price_cents
        )));
    }
    Ok(())
}
