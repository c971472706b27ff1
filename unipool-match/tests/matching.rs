use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use unipool_core::repository::{UnitOfWork, UserRepository};
use unipool_core::{Caller, CoreError, Page, RideQuery, Transaction};
use unipool_match::{MatchRequest, MatchWeights, PatternAnalyzer, PickupRecommender, RideMatcher};
use unipool_shared::{Booking, BookingStatus, Rating, Ride, RideDraft, RideStatus, User, UserRole};
use unipool_store::app_config::MatchingConfig;
use unipool_store::MemoryStore;

fn departure() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 4, 8, 0, 0).unwrap()
}

async fn driver(store: &MemoryStore, name: &str) -> User {
    let user = User::new(name.to_string(), format!("{}@uni.edu.pk", name), UserRole::Driver);
    store.insert_user(&user).await.unwrap();
    user
}

async fn ride(store: &MemoryStore, driver: &User, origin: &str, price_cents: i32, departure_time: DateTime<Utc>) -> Ride {
    let ride = Ride::new(
        driver.id,
        RideDraft {
            origin: origin.to_string(),
            destination: "COMSATS Islamabad".to_string(),
            description: None,
            departure_time,
            total_seats: 3,
            price_cents,
        },
    );
    let mut tx = Transaction::new();
    tx.insert_ride(ride.clone());
    store.commit(tx).await.unwrap();
    ride
}

async fn rate(store: &MemoryStore, rated: &User, score: i32) {
    let mut tx = Transaction::new();
    tx.insert_rating(Rating::new(uuid::Uuid::new_v4(), rated.id, None, score, None));
    store.commit(tx).await.unwrap();
}

fn rider() -> Caller {
    Caller::new(uuid::Uuid::new_v4(), UserRole::Passenger)
}

#[tokio::test]
async fn test_price_only_weights_rank_cheaper_ride_first() {
    let store = Arc::new(MemoryStore::new());
    let a = driver(&store, "qasim").await;
    let b = driver(&store, "rubina").await;
    let cheap = ride(&store, &a, "Blue Area", 500, departure()).await;
    let pricey = ride(&store, &b, "F-7", 1000, departure()).await;

    let matcher = RideMatcher::new(store.clone(), MatchingConfig::default());
    let ranked = matcher
        .find_matches(
            &rider(),
            &MatchRequest {
                weights: Some(MatchWeights::new(0.0, 1.0, 0.0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].ride.id, cheap.id);
    assert!((ranked[0].breakdown.price - 0.5).abs() < 1e-9);
    assert_eq!(ranked[1].ride.id, pricey.id);
    assert_eq!(ranked[1].breakdown.price, 0.0);
}

#[tokio::test]
async fn test_default_weights_blend_all_signals() {
    let store = Arc::new(MemoryStore::new());
    let rated = driver(&store, "sadia").await;
    let unrated = driver(&store, "tahir").await;
    for score in [5, 4, 3] {
        rate(&store, &rated, score).await;
    }

    let on_time = ride(&store, &rated, "I-10", 1000, departure()).await;
    let late = ride(&store, &unrated, "G-11", 500, departure() + Duration::minutes(45)).await;

    let matcher = RideMatcher::new(store.clone(), MatchingConfig::default());
    let ranked = matcher
        .find_matches(
            &rider(),
            &MatchRequest {
                preferred_departure: Some(departure()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // 0.3 * 0.8 + 0.3 * 0.0 + 0.4 * 1.0
    assert_eq!(ranked[0].ride.id, on_time.id);
    assert!((ranked[0].score - 0.64).abs() < 1e-9);
    assert!((ranked[0].breakdown.rating - 0.8).abs() < 1e-9);

    // Unrated driver sits at the neutral 0.5: 0.3 * 0.5 + 0.3 * 0.5 + 0.4 * 0.0
    assert_eq!(ranked[1].ride.id, late.id);
    assert!((ranked[1].score - 0.30).abs() < 1e-9);
    assert!((ranked[1].breakdown.rating - 0.5).abs() < 1e-9);
    assert_eq!(ranked[1].breakdown.proximity, 0.0);
}

#[tokio::test]
async fn test_own_and_unavailable_rides_are_excluded() {
    let store = Arc::new(MemoryStore::new());
    let me = driver(&store, "umair").await;
    let other = driver(&store, "vaneeza").await;
    ride(&store, &me, "E-11", 800, departure()).await;
    let mut finished = ride(&store, &other, "F-6", 800, departure()).await;
    let open = ride(&store, &other, "F-8", 800, departure()).await;

    finished.status = RideStatus::Completed;
    let mut tx = Transaction::new();
    tx.update_ride(finished);
    store.commit(tx).await.unwrap();

    let matcher = RideMatcher::new(store.clone(), MatchingConfig::default());
    let ranked = matcher
        .find_matches(&Caller::new(me.id, UserRole::Both), &MatchRequest::default())
        .await
        .unwrap();

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].ride.id, open.id);
}

#[tokio::test]
async fn test_results_are_truncated_and_filtered() {
    let store = Arc::new(MemoryStore::new());
    let d = driver(&store, "waleed").await;
    for i in 0..5 {
        ride(&store, &d, &format!("Sector {}", i), 1000 + i, departure()).await;
    }
    ride(&store, &d, "Expensive", 9000, departure()).await;

    let config = MatchingConfig {
        max_results: 3,
        ..MatchingConfig::default()
    };
    let matcher = RideMatcher::new(store.clone(), config);
    let ranked = matcher
        .find_matches(
            &rider(),
            &MatchRequest {
                query: RideQuery {
                    max_price_cents: Some(5000),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(ranked.len(), 3);
    assert!(ranked.iter().all(|s| s.ride.price_cents < 5000));
}

#[tokio::test]
async fn test_invalid_weights_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let matcher = RideMatcher::new(store.clone(), MatchingConfig::default());

    let err = matcher
        .find_matches(
            &rider(),
            &MatchRequest {
                weights: Some(MatchWeights::new(0.5, -1.0, 0.5)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_out_of_range_window_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let d = driver(&store, "zainab").await;
    ride(&store, &d, "DHA", 1000, departure()).await;

    for minutes in [i64::MAX, 0, -30] {
        let config = MatchingConfig {
            proximity_window_minutes: minutes,
            ..MatchingConfig::default()
        };
        let matcher = RideMatcher::new(store.clone(), config);
        let err = matcher
            .find_matches(
                &rider(),
                &MatchRequest {
                    preferred_departure: Some(departure()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)), "{} minutes", minutes);
    }
}

#[tokio::test]
async fn test_oversized_page_is_capped() {
    let store = Arc::new(MemoryStore::new());
    let d = driver(&store, "asad").await;
    for i in 0..3 {
        ride(&store, &d, &format!("Phase {}", i), 1000, departure()).await;
    }

    let matcher = RideMatcher::new(store.clone(), MatchingConfig::default());
    let ranked = matcher
        .find_matches(
            &rider(),
            &MatchRequest {
                query: RideQuery {
                    page: Page::new(0, usize::MAX),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ranked.len(), 3);
}

#[tokio::test]
async fn test_pickup_recommendations_by_destination() {
    let store = Arc::new(MemoryStore::new());
    let d = driver(&store, "yusra").await;
    for origin in ["G-9", "F-10", "G-9", "G-9", "F-10", "Bahria"] {
        ride(&store, &d, origin, 1000, departure()).await;
    }

    let recommender = PickupRecommender::new(store.clone());
    let suggestions = recommender.recommend("comsats").await.unwrap();
    assert_eq!(suggestions[0].origin, "G-9");
    assert_eq!(suggestions[0].frequency, 3);
    assert_eq!(suggestions[1].origin, "F-10");
    assert_eq!(suggestions.len(), 3);

    assert!(recommender.recommend("LUMS").await.unwrap().is_empty());

    // Finished trips still count toward where riders gather
    let mut done = ride(&store, &d, "Bahria", 1000, departure()).await;
    done.status = RideStatus::Completed;
    let mut tx = Transaction::new();
    tx.update_ride(done);
    store.commit(tx).await.unwrap();
    let mut dropped = ride(&store, &d, "Bahria", 1000, departure()).await;
    dropped.status = RideStatus::Cancelled;
    let mut tx = Transaction::new();
    tx.update_ride(dropped);
    store.commit(tx).await.unwrap();

    let suggestions = recommender.recommend("COMSATS").await.unwrap();
    let bahria = suggestions.iter().find(|s| s.origin == "Bahria").unwrap();
    assert_eq!(bahria.frequency, 3);
    assert!(matches!(
        recommender.recommend("  ").await.unwrap_err(),
        CoreError::ValidationError(_)
    ));
}

#[tokio::test]
async fn test_patterns_combine_driving_and_riding() {
    let store = Arc::new(MemoryStore::new());
    let me = driver(&store, "bisma").await;
    let other = driver(&store, "danish").await;
    ride(&store, &me, "PWD", 1000, departure()).await;
    ride(&store, &me, "PWD", 1000, departure() + Duration::hours(9)).await;

    let shared = ride(&store, &other, "Saddar", 1000, departure()).await;
    let refused = ride(&store, &other, "Airport", 1000, departure()).await;
    let mut tx = Transaction::new();
    tx.insert_booking(Booking::new(shared.id, me.id, 1));
    let mut rejected = Booking::new(refused.id, me.id, 1);
    rejected.status = BookingStatus::Rejected;
    tx.insert_booking(rejected);
    store.commit(tx).await.unwrap();

    let analyzer = PatternAnalyzer::new(store.clone());
    let caller = Caller::new(me.id, UserRole::Both);
    let patterns = analyzer.analyze(me.id, &caller).await.unwrap();

    assert_eq!(patterns.driver_rides, 2);
    assert_eq!(patterns.passenger_rides, 1);
    assert_eq!(patterns.total_rides, 3);
    assert_eq!(patterns.top_origins[0].location, "PWD");
    assert_eq!(patterns.top_origins[0].frequency, 2);
    assert!(patterns.top_origins.iter().all(|o| o.location != "Airport"));
    assert_eq!(patterns.top_destinations[0].frequency, 3);
    assert_eq!(patterns.top_times[0].time, "08:00");
    assert_eq!(patterns.top_times[0].frequency, 2);

    let err = analyzer.analyze(other.id, &caller).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let stranger = uuid::Uuid::new_v4();
    let err = analyzer
        .analyze(stranger, &Caller::new(stranger, UserRole::Passenger))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "user", .. }));
}
