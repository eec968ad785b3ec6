//! Runs against a live PostgreSQL; `cargo test -- --ignored` with
//! `RENTACAR_DATABASE_URL` pointing at a scratch database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rentacar_booking::config::{BookingConfig, DatabaseConfig};
use rentacar_booking::domain::{
    GeoPoint, NewVehicle, ReservationOperations, ReservationStatus, UserId, Vehicle, VehicleType,
};
use rentacar_booking::storage::{BookingStore, PgBookingStore, ReservationStore, VehicleStore};
use rentacar_booking::{BookingEngine, BookingError};
use rust_decimal_macros::dec;
use std::sync::Arc;

async fn store() -> Arc<PgBookingStore> {
    let url = std::env::var("RENTACAR_DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url);
    let config = DatabaseConfig {
        url,
        max_connections: 5,
        ..DatabaseConfig::default()
    };
    let store = PgBookingStore::connect(&config)
        .await
        .expect("Failed to connect to database");
    store.run_migrations().await.expect("Failed to run migrations");
    Arc::new(store)
}

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap() + Duration::days(n)
}

async fn add_vehicle(engine: &BookingEngine) -> Vehicle {
    engine
        .catalog()
        .add(NewVehicle {
            brand: "Renault".to_string(),
            model: "Clio".to_string(),
            year: 2024,
            vehicle_type: VehicleType::Compact,
            license_plate: format!("TEST-{}", uuid::Uuid::new_v4().simple()),
            seats: 5,
            fuel_type: Some("hybrid".to_string()),
            color: None,
            daily_rate: dec!(89.50),
            available: true,
            position: Some(GeoPoint::new(52.2297, 21.0122).unwrap()),
        })
        .await
        .expect("Failed to add vehicle")
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_booking_lifecycle() {
    let store = store().await;
    let engine = BookingEngine::new(&BookingConfig::default(), store.clone());
    let vehicle = add_vehicle(&engine).await;
    let reservations = engine.reservations();

    let booking = reservations
        .create(UserId::new("pg-user"), &vehicle.id, day(0), day(2))
        .await
        .expect("Failed to create reservation");
    assert_eq!(booking.total_cost.as_decimal(), dec!(179.00));

    let stored = store.get_reservation(&booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Pending);
    assert_eq!(stored.window, booking.window);

    assert!(matches!(
        reservations.create(UserId::new("other"), &vehicle.id, day(2), day(3)).await,
        Err(BookingError::BookingConflict { .. })
    ));

    let reference = format!("pi_{}", uuid::Uuid::new_v4().simple());
    reservations.confirm_payment(&booking.id, reference.clone()).await.unwrap();
    reservations.complete(&booking.id).await.unwrap();
    reservations.rate(&booking.id, 4, Some("smooth pickup".to_string())).await.unwrap();

    let rated = store.get_vehicle(&vehicle.id).await.unwrap().unwrap();
    assert_eq!(rated.rating.count, 1);
    assert_eq!(rated.rating.mean, 4.0);

    let found = store.find_by_payment_reference(&reference).await.unwrap().unwrap();
    assert_eq!(found.id, booking.id);

    assert_eq!(engine.catalog().delete(&vehicle.id).await.unwrap(), 1);
    assert!(store.get_vehicle(&vehicle.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_exclusion_constraint_blocks_overlap() {
    let store = store().await;
    let engine = BookingEngine::new(&BookingConfig::default(), store.clone());
    let vehicle = add_vehicle(&engine).await;

    let first = engine
        .reservations()
        .create(UserId::new("a"), &vehicle.id, day(10), day(12))
        .await
        .unwrap();

    // Bypass the overlap check and hit the constraint directly
    let mut clash = first.clone();
    clash.id = rentacar_booking::domain::ReservationId::new();
    let result = store.save_reservation(&clash).await;
    assert!(matches!(result, Err(BookingError::BookingConflict { .. })));

    assert!(matches!(
        store.insert_reservation(&clash).await,
        Err(BookingError::BookingConflict { .. })
    ));

    engine.reservations().cancel(&first.id).await.unwrap();
    store.save_reservation(&clash).await.unwrap();

    let booked = store
        .find_booked_vehicle_ids(day(11), day(11), ReservationStatus::Canceled)
        .await
        .unwrap();
    assert!(booked.contains(&vehicle.id));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_payment_reference_is_unique() {
    let store = store().await;
    let engine = BookingEngine::new(&BookingConfig::default(), store.clone());
    let vehicle = add_vehicle(&engine).await;
    let reservations = engine.reservations();

    let first = reservations
        .create(UserId::new("a"), &vehicle.id, day(20), day(21))
        .await
        .unwrap();
    let second = reservations
        .create(UserId::new("b"), &vehicle.id, day(23), day(24))
        .await
        .unwrap();

    let reference = format!("pi_{}", uuid::Uuid::new_v4().simple());
    reservations.confirm_payment(&first.id, reference.clone()).await.unwrap();

    let err = reservations
        .confirm_payment(&second.id, reference.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::PaymentReferenceInUse { .. }));
    assert!(err.is_recoverable());

    let untouched = store.get_reservation(&second.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, ReservationStatus::Pending);

    let refunded = reservations.cancel_by_payment(&reference).await.unwrap();
    assert_eq!(refunded.id, first.id);
}
