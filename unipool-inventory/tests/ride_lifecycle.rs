use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use unipool_core::repository::{BookingRepository, UnitOfWork, UserRepository};
use unipool_core::{Caller, CoreError, Page, RideQuery, Transaction, UserIndex};
use unipool_inventory::{check_invariants, RidePatch, RideService, SeatLedger};
use unipool_shared::{
    Booking, BookingStatus, RideDraft, RideStatus, SeatEventKind, User, UserRole,
};
use unipool_store::{BookingRules, MemoryStore};

async fn user(store: &MemoryStore, name: &str, role: UserRole) -> Caller {
    let user = User::new(name.to_string(), format!("{}@uni.edu.pk", name), role);
    store.insert_user(&user).await.unwrap();
    Caller::new(user.id, role)
}

fn draft(origin: &str, destination: &str, seats: i32) -> RideDraft {
    RideDraft {
        origin: origin.to_string(),
        destination: destination.to_string(),
        description: Some("AC car, no smoking".to_string()),
        departure_time: Utc::now() + Duration::hours(4),
        total_seats: seats,
        price_cents: 30000,
    }
}

fn service(store: &Arc<MemoryStore>) -> RideService {
    RideService::new(store.clone(), BookingRules::default())
}

/// Books seats directly through the ledger, the way the booking manager does
async fn book(store: &MemoryStore, ride_id: Uuid, passenger: Uuid, seats: i32, status: BookingStatus) -> Booking {
    use unipool_core::repository::RideRepository;

    let mut ride = store.get_ride(ride_id).await.unwrap().unwrap();
    let mut booking = Booking::new(ride_id, passenger, seats);
    {
        let mut ledger = SeatLedger::new(&mut ride);
        ledger.reserve(booking.id, passenger, seats).unwrap();
        if status == BookingStatus::Accepted {
            ledger.confirm(booking.id).unwrap();
        }
    }
    booking.status = status;

    let mut tx = Transaction::new();
    tx.insert_booking(booking.clone())
        .update_ride(ride)
        .index_push(passenger, UserIndex::Bookings, booking.id);
    store.commit(tx).await.unwrap();
    booking
}

#[tokio::test]
async fn test_publish_records_ride_and_driver_index() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "ayesha", UserRole::Driver).await;
    let rides = service(&store);

    let ride = rides.publish(&driver, draft("Johar Town", "LUMS", 3)).await.unwrap();
    assert_eq!(ride.seats_available, 3);
    assert_eq!(ride.status, RideStatus::Pending);

    let stored = store.get_user(driver.user_id).await.unwrap().unwrap();
    assert_eq!(stored.rides_offered, vec![ride.id]);

    let fetched = rides.get(ride.id).await.unwrap();
    assert_eq!(fetched.origin, "Johar Town");
}

#[tokio::test]
async fn test_publish_validation() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "bilal", UserRole::Both).await;
    let passenger = user(&store, "sana", UserRole::Passenger).await;
    let rides = service(&store);

    let err = rides.publish(&passenger, draft("DHA", "LUMS", 3)).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = rides.publish(&driver, draft("DHA", "LUMS", 0)).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidSeatCount(0)));

    let mut negative = draft("DHA", "LUMS", 2);
    negative.price_cents = -100;
    let err = rides.publish(&driver, negative).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    let err = rides.publish(&driver, draft("  ", "LUMS", 2)).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_search_is_case_insensitive_and_pending_only() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "hamza", UserRole::Driver).await;
    let rides = service(&store);

    let open = rides.publish(&driver, draft("Gulberg III", "FAST NUCES", 3)).await.unwrap();
    let started = rides.publish(&driver, draft("Gulberg II", "FAST NUCES", 3)).await.unwrap();
    rides.start(started.id, &driver).await.unwrap();

    let found = rides
        .search(&RideQuery {
            origin: Some("gulberg".to_string()),
            destination: Some("nuces".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, open.id);
}

#[tokio::test]
async fn test_update_is_driver_only_and_pending_only() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "zara", UserRole::Driver).await;
    let stranger = user(&store, "omar", UserRole::Both).await;
    let rides = service(&store);
    let ride = rides.publish(&driver, draft("Township", "UCP", 2)).await.unwrap();

    let patch = RidePatch {
        price_cents: Some(45000),
        destination: Some("UCP Main Campus".to_string()),
        ..Default::default()
    };

    let err = rides.update(ride.id, &stranger, patch.clone()).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let updated = rides.update(ride.id, &driver, patch.clone()).await.unwrap();
    assert_eq!(updated.price_cents, 45000);
    assert_eq!(updated.destination, "UCP Main Campus");
    assert_eq!(updated.total_seats, 2);
    assert_eq!(updated.version, ride.version + 1);

    rides.start(ride.id, &driver).await.unwrap();
    let err = rides.update(ride.id, &driver, patch).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_start_requires_pending() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "ali", UserRole::Driver).await;
    let rides = service(&store);
    let ride = rides.publish(&driver, draft("Wapda Town", "PU", 2)).await.unwrap();

    let err = rides.complete(ride.id, &driver).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    let started = rides.start(ride.id, &driver).await.unwrap();
    assert_eq!(started.status, RideStatus::InProgress);

    let err = rides.start(ride.id, &driver).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_complete_cascades_to_bookings() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "fatima", UserRole::Driver).await;
    let accepted_rider = user(&store, "usman", UserRole::Passenger).await;
    let pending_rider = user(&store, "hina", UserRole::Passenger).await;
    let rides = service(&store);
    let ride = rides.publish(&driver, draft("Bahria Town", "LUMS", 4)).await.unwrap();

    let accepted = book(&store, ride.id, accepted_rider.user_id, 2, BookingStatus::Accepted).await;
    let pending = book(&store, ride.id, pending_rider.user_id, 1, BookingStatus::Pending).await;

    rides.start(ride.id, &driver).await.unwrap();
    let completed = rides.complete(ride.id, &driver).await.unwrap();

    assert_eq!(completed.status, RideStatus::Completed);
    assert_eq!(completed.seats_available, 2);
    assert_eq!(completed.passengers, vec![accepted_rider.user_id]);
    check_invariants(&completed).unwrap();

    let accepted = store.get_booking(accepted.id).await.unwrap().unwrap();
    assert_eq!(accepted.status, BookingStatus::Completed);
    let pending = store.get_booking(pending.id).await.unwrap().unwrap();
    assert_eq!(pending.status, BookingStatus::Rejected);
}

#[tokio::test]
async fn test_cancel_releases_every_open_booking() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "kamran", UserRole::Driver).await;
    let first = user(&store, "maryam", UserRole::Passenger).await;
    let second = user(&store, "saad", UserRole::Both).await;
    let (events, mut feed) = broadcast::channel(16);
    let rides = service(&store).with_events(events);
    let ride = rides.publish(&driver, draft("Cantt", "GCU", 3)).await.unwrap();

    let a = book(&store, ride.id, first.user_id, 1, BookingStatus::Accepted).await;
    let b = book(&store, ride.id, second.user_id, 2, BookingStatus::Pending).await;

    let err = rides.cancel(ride.id, &first).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let cancelled = rides.cancel(ride.id, &driver).await.unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert_eq!(cancelled.seats_available, 3);
    assert!(cancelled.passengers.is_empty());

    for id in [a.id, b.id] {
        let booking = store.get_booking(id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    let mut kinds = Vec::new();
    while let Ok(event) = feed.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![SeatEventKind::Released, SeatEventKind::Released, SeatEventKind::RideCancelled]
    );

    let err = rides.cancel(ride.id, &driver).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    let history = store
        .list_bookings_by_ride(ride.id, None, Page::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_list_for_driver_filters_by_status() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "nida", UserRole::Driver).await;
    let rides = service(&store);

    let first = rides.publish(&driver, draft("Iqbal Town", "LUMS", 2)).await.unwrap();
    rides.publish(&driver, draft("Iqbal Town", "UMT", 2)).await.unwrap();
    rides.cancel(first.id, &driver).await.unwrap();

    let all = rides.list_for_driver(driver.user_id, None, Page::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let cancelled = rides
        .list_for_driver(driver.user_id, Some(RideStatus::Cancelled), Page::default())
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, first.id);
}

#[tokio::test]
async fn test_missing_ride_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let driver = user(&store, "tariq", UserRole::Driver).await;
    let rides = service(&store);

    let err = rides.start(Uuid::new_v4(), &driver).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "ride", .. }));
}
