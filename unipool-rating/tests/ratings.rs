use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use unipool_booking::BookingManager;
use unipool_core::repository::UserRepository;
use unipool_core::{Caller, CoreError, Page};
use unipool_inventory::RideService;
use unipool_rating::RatingAggregator;
use unipool_shared::{BookingStatus, Ride, RideDraft, User, UserRole};
use unipool_store::{BookingRules, MemoryStore};

struct Fixture {
    store: Arc<MemoryStore>,
    rides: RideService,
    bookings: BookingManager,
    ratings: RatingAggregator,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            rides: RideService::new(store.clone(), BookingRules::default()),
            bookings: BookingManager::new(store.clone(), BookingRules::default()),
            ratings: RatingAggregator::new(store.clone()),
            store,
        }
    }

    async fn user(&self, name: &str, role: UserRole) -> Caller {
        let user = User::new(name.to_string(), format!("{}@uni.edu.pk", name), role);
        self.store.insert_user(&user).await.unwrap();
        Caller::new(user.id, role)
    }

    async fn ride(&self, driver: &Caller) -> Ride {
        self.rides
            .publish(
                driver,
                RideDraft {
                    origin: "Satellite Town".to_string(),
                    destination: "NUST".to_string(),
                    description: None,
                    departure_time: Utc::now() + Duration::hours(1),
                    total_seats: 4,
                    price_cents: 15000,
                },
            )
            .await
            .unwrap()
    }

    /// A passenger whose booking the driver accepted
    async fn carried(&self, driver: &Caller, ride: &Ride, name: &str) -> Caller {
        let passenger = self.user(name, UserRole::Passenger).await;
        let booking = self.bookings.create(&passenger, ride.id, 1).await.unwrap();
        self.bookings
            .set_status(booking.id, BookingStatus::Accepted, driver)
            .await
            .unwrap();
        passenger
    }
}

#[tokio::test]
async fn test_average_of_received_scores() {
    let fx = Fixture::new();
    let driver = fx.user("rehan", UserRole::Driver).await;
    let ride = fx.ride(&driver).await;

    assert_eq!(fx.ratings.average_for(driver.user_id).await.unwrap(), 0.0);

    for (name, score) in [("adil", 5), ("bushra", 4), ("celina", 3)] {
        let passenger = fx.carried(&driver, &ride, name).await;
        fx.ratings
            .record(&passenger, driver.user_id, ride.id, score, None)
            .await
            .unwrap();
    }

    assert!((fx.ratings.average_for(driver.user_id).await.unwrap() - 4.0).abs() < 1e-9);
    let summary = fx.ratings.summary_for(driver.user_id).await.unwrap();
    assert_eq!(summary.count, 3);

    let stored = fx.store.get_user(driver.user_id).await.unwrap().unwrap();
    assert_eq!(stored.ratings_received.len(), 3);
}

#[tokio::test]
async fn test_driver_rates_carried_passenger() {
    let fx = Fixture::new();
    let driver = fx.user("shahid", UserRole::Driver).await;
    let ride = fx.ride(&driver).await;
    let passenger = fx.carried(&driver, &ride, "dua").await;

    let rating = fx
        .ratings
        .record(&driver, passenger.user_id, ride.id, 4, Some("On time".to_string()))
        .await
        .unwrap();

    assert_eq!(rating.ride_id, Some(ride.id));
    let for_ride = fx.ratings.list_for_ride(ride.id).await.unwrap();
    assert_eq!(for_ride.len(), 1);
    let received = fx
        .ratings
        .list_received(passenger.user_id, Page::default())
        .await
        .unwrap();
    assert_eq!(received[0].comment.as_deref(), Some("On time"));
}

#[tokio::test]
async fn test_relationship_rules() {
    let fx = Fixture::new();
    let driver = fx.user("yasir", UserRole::Driver).await;
    let ride = fx.ride(&driver).await;
    let passenger = fx.carried(&driver, &ride, "eman").await;
    let stranger = fx.user("farhan", UserRole::Passenger).await;

    let pending = fx.user("ghazal", UserRole::Passenger).await;
    fx.bookings.create(&pending, ride.id, 1).await.unwrap();

    for score in [0, 6] {
        let err = fx
            .ratings
            .record(&passenger, driver.user_id, ride.id, score, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidScore(_)));
    }

    let err = fx
        .ratings
        .record(&passenger, driver.user_id, Uuid::new_v4(), 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "ride", .. }));

    let err = fx
        .ratings
        .record(&driver, driver.user_id, ride.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationship(_)));

    let err = fx
        .ratings
        .record(&stranger, driver.user_id, ride.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationship(_)));

    let err = fx
        .ratings
        .record(&pending, driver.user_id, ride.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationship(_)));

    let err = fx
        .ratings
        .record(&passenger, pending.user_id, ride.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationship(_)));

    fx.ratings
        .record(&passenger, driver.user_id, ride.id, 5, None)
        .await
        .unwrap();
    let err = fx
        .ratings
        .record(&passenger, driver.user_id, ride.id, 4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationship(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_rating_lands_once() {
    let fx = Fixture::new();
    let driver = fx.user("imran", UserRole::Driver).await;
    let ride = fx.ride(&driver).await;
    let passenger = fx.carried(&driver, &ride, "javeria").await;
    let ratings = Arc::new(RatingAggregator::new(fx.store.clone()));

    let handles: Vec<_> = [5, 1]
        .into_iter()
        .map(|score| {
            let ratings = ratings.clone();
            let driver_id = driver.user_id;
            let ride_id = ride.id;
            tokio::spawn(async move { ratings.record(&passenger, driver_id, ride_id, score, None).await })
        })
        .collect();

    let mut recorded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => recorded += 1,
            Err(err) => assert!(matches!(err, CoreError::InvalidRelationship(_)), "{}", err),
        }
    }
    assert_eq!(recorded, 1);

    let summary = fx.ratings.summary_for(driver.user_id).await.unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(fx.ratings.list_for_ride(ride.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_only_rater_can_delete() {
    let fx = Fixture::new();
    let driver = fx.user("sohail", UserRole::Driver).await;
    let ride = fx.ride(&driver).await;
    let passenger = fx.carried(&driver, &ride, "hafsa").await;

    let rating = fx
        .ratings
        .record(&passenger, driver.user_id, ride.id, 2, None)
        .await
        .unwrap();

    let err = fx.ratings.delete(rating.id, &driver).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    fx.ratings.delete(rating.id, &passenger).await.unwrap();
    assert!(matches!(
        fx.ratings.get(rating.id).await.unwrap_err(),
        CoreError::NotFound { entity: "rating", .. }
    ));
    assert_eq!(fx.ratings.average_for(driver.user_id).await.unwrap(), 0.0);

    let stored = fx.store.get_user(driver.user_id).await.unwrap().unwrap();
    assert!(stored.ratings_received.is_empty());
}
