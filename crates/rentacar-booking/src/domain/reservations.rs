use crate::domain::availability::AvailabilityChecker;
use crate::domain::locks::VehicleLocks;
use crate::domain::pricing::PricingEngine;
use crate::domain::types::{
    Money, Rating, ReservationId, ReservationStatus, TimeWindow, UserId, VehicleId,
};
use crate::error::{BookingError, Result};
use crate::storage::BookingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub window: TimeWindow,
    pub total_cost: Money,
    pub status: ReservationStatus,
    pub rating: Option<Rating>,
    pub feedback: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(user_id: UserId, vehicle_id: VehicleId, window: TimeWindow, total_cost: Money) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            user_id,
            vehicle_id,
            window,
            total_cost,
            status: ReservationStatus::Pending,
            rating: None,
            feedback: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn transition_to(&mut self, next: ReservationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BookingError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
pub trait ReservationOperations: Send + Sync {
    async fn create(
        &self,
        user_id: UserId,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Reservation>;

    async fn confirm(&self, id: &ReservationId) -> Result<Reservation>;

    async fn cancel(&self, id: &ReservationId) -> Result<Reservation>;

    async fn complete(&self, id: &ReservationId) -> Result<Reservation>;

    async fn rate(&self, id: &ReservationId, rating: i64, feedback: Option<String>) -> Result<Reservation>;

    /// Called once the payment gateway has accepted payment for a pending
    /// reservation.
    async fn confirm_payment(&self, id: &ReservationId, payment_reference: String) -> Result<Reservation>;

    /// Called when the payment behind a reservation is refunded.
    async fn cancel_by_payment(&self, payment_reference: &str) -> Result<Reservation>;

    async fn get(&self, id: &ReservationId) -> Result<Reservation>;

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Reservation>>;

    async fn for_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Reservation>>;

    async fn all(&self) -> Result<Vec<Reservation>>;
}

pub struct ReservationManager {
    store: Arc<dyn BookingStore>,
    checker: AvailabilityChecker,
    pricing: PricingEngine,
    locks: Arc<VehicleLocks>,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn BookingStore>, pricing: PricingEngine, locks: Arc<VehicleLocks>) -> Self {
        Self {
            checker: AvailabilityChecker::new(store.clone()),
            store,
            pricing,
            locks,
        }
    }

    pub fn checker(&self) -> &AvailabilityChecker {
        &self.checker
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Move a reservation to `next` under its vehicle's lock. The write is
    /// conditional on the status read here, so a writer in another process
    /// that moved it first makes this call fail instead of being overwritten.
    async fn transition(
        &self,
        id: &ReservationId,
        next: ReservationStatus,
        payment_reference: Option<String>,
    ) -> Result<Reservation> {
        let vehicle_id = self.get(id).await?.vehicle_id;
        let _guard = self.locks.acquire(&vehicle_id).await?;

        let mut reservation = self.get(id).await?;
        let previous = reservation.status;
        reservation.transition_to(next)?;
        if payment_reference.is_some() {
            reservation.payment_reference = payment_reference;
        }

        if !self.store.update_if_status(&reservation, previous).await? {
            let latest = self.get(id).await?;
            warn!(
                "Reservation {} changed to {} while moving {} -> {}",
                id, latest.status, previous, next
            );
            return Err(BookingError::InvalidTransition {
                from: latest.status.to_string(),
                to: next.to_string(),
            });
        }

        info!("Reservation {} moved {} -> {}", id, previous, next);
        Ok(reservation)
    }
}

#[async_trait]
impl ReservationOperations for ReservationManager {
    async fn create(
        &self,
        user_id: UserId,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Reservation> {
        let window = TimeWindow::new(start, end)?;

        // Rate changes take the same lock, so the rate read below is current.
        let _guard = self.locks.acquire(vehicle_id).await?;
        let vehicle = self
            .store
            .get_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| BookingError::VehicleNotFound {
                id: vehicle_id.to_string(),
            })?;

        if self.checker.has_overlap(vehicle_id, &window).await? {
            warn!("Rejected booking of vehicle {} for {}: overlap", vehicle_id, window);
            return Err(BookingError::BookingConflict {
                vehicle_id: vehicle_id.to_string(),
                start,
                end,
            });
        }

        let total_cost = self.pricing.price(vehicle.daily_rate, &window)?;
        if total_cost.is_zero() {
            return Err(BookingError::ZeroCost {
                vehicle_id: vehicle_id.to_string(),
            });
        }
        let reservation = Reservation::new(user_id, *vehicle_id, window, total_cost);
        self.store.insert_reservation(&reservation).await?;

        info!(
            "Created reservation {} for user {} on vehicle {} {} costing {}",
            reservation.id, reservation.user_id, vehicle_id, window, total_cost
        );
        Ok(reservation)
    }

    async fn confirm(&self, id: &ReservationId) -> Result<Reservation> {
        self.transition(id, ReservationStatus::Confirmed, None).await
    }

    async fn cancel(&self, id: &ReservationId) -> Result<Reservation> {
        self.transition(id, ReservationStatus::Canceled, None).await
    }

    async fn complete(&self, id: &ReservationId) -> Result<Reservation> {
        self.transition(id, ReservationStatus::Completed, None).await
    }

    async fn rate(&self, id: &ReservationId, rating: i64, feedback: Option<String>) -> Result<Reservation> {
        let rating = Rating::new(rating)?;

        let current = self.get(id).await?;
        if current.status != ReservationStatus::Completed {
            return Err(BookingError::InvalidTransition {
                from: current.status.to_string(),
                to: "rated".to_string(),
            });
        }
        if current.rating.is_some() {
            return Err(BookingError::AlreadyRated { id: id.to_string() });
        }

        let _guard = self.locks.acquire(&current.vehicle_id).await?;
        let (reservation, vehicle) = self.store.record_rating(id, rating, feedback).await?;

        info!(
            "Reservation {} rated {}; vehicle {} now {:.2} over {} ratings",
            id, rating, vehicle.id, vehicle.rating.mean, vehicle.rating.count
        );
        Ok(reservation)
    }

    async fn confirm_payment(&self, id: &ReservationId, payment_reference: String) -> Result<Reservation> {
        self.transition(id, ReservationStatus::Confirmed, Some(payment_reference))
            .await
    }

    async fn cancel_by_payment(&self, payment_reference: &str) -> Result<Reservation> {
        let reservation = self
            .store
            .find_by_payment_reference(payment_reference)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound {
                id: format!("payment:{payment_reference}"),
            })?;
        self.transition(&reservation.id, ReservationStatus::Canceled, None)
            .await
    }

    async fn get(&self, id: &ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound { id: id.to_string() })
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Reservation>> {
        self.store.find_by_user(user_id).await
    }

    async fn for_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Reservation>> {
        self.store.find_by_vehicle(vehicle_id).await
    }

    async fn all(&self) -> Result<Vec<Reservation>> {
        self.store.list_reservations().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vehicles::{NewVehicle, Vehicle};
    use crate::domain::types::VehicleType;
    use crate::storage::{InMemoryStore, VehicleStore};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<InMemoryStore>,
        locks: Arc<VehicleLocks>,
        manager: ReservationManager,
        vehicle: Vehicle,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let vehicle = Vehicle::new(NewVehicle {
            brand: "Skoda".to_string(),
            model: "Octavia".to_string(),
            year: 2021,
            vehicle_type: VehicleType::Sedan,
            license_plate: "WX 12345".to_string(),
            seats: 5,
            fuel_type: Some("diesel".to_string()),
            color: Some("grey".to_string()),
            daily_rate: dec!(100.00),
            available: true,
            position: None,
        })
        .unwrap();
        store.save_vehicle(&vehicle).await.unwrap();

        let locks = Arc::new(VehicleLocks::new(std::time::Duration::from_secs(1)));
        let manager = ReservationManager::new(store.clone(), PricingEngine::default(), locks.clone());
        Fixture {
            store,
            locks,
            manager,
            vehicle,
        }
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn user() -> UserId {
        UserId::new("anna@example.com")
    }

    #[test]
    fn test_transition_rules() {
        let window = TimeWindow::new(day(0), day(1)).unwrap();
        let mut reservation = Reservation::new(user(), VehicleId::new(), window, Money::zero());
        assert!(reservation.is_active());

        reservation.transition_to(ReservationStatus::Confirmed).unwrap();
        reservation.transition_to(ReservationStatus::Completed).unwrap();
        assert!(!reservation.is_active());
        assert!(matches!(
            reservation.transition_to(ReservationStatus::Canceled),
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_prices_and_persists_pending() {
        let f = fixture().await;
        let reservation = f
            .manager
            .create(user(), &f.vehicle.id, day(0), day(2))
            .await
            .unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.total_cost.as_decimal(), dec!(200.00));
        assert_eq!(f.manager.get(&reservation.id).await.unwrap(), reservation);
        assert_eq!(f.manager.for_user(&user()).await.unwrap().len(), 1);
        assert_eq!(f.manager.for_vehicle(&f.vehicle.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_prices_rate_current_under_lock() {
        let f = fixture().await;
        let guard = f.locks.acquire(&f.vehicle.id).await.unwrap();

        let (created, _) = tokio::join!(
            f.manager.create(user(), &f.vehicle.id, day(0), day(2)),
            async {
                tokio::task::yield_now().await;
                let mut repriced = f.vehicle.clone();
                repriced.daily_rate = Money::from_decimal(dec!(150.00));
                f.store.save_vehicle(&repriced).await.unwrap();
                drop(guard);
            }
        );

        assert_eq!(created.unwrap().total_cost.as_decimal(), dec!(300.00));
    }

    #[tokio::test]
    async fn test_create_refuses_free_and_unpriceable_bookings() {
        let f = fixture().await;

        let mut free = f.vehicle.clone();
        free.daily_rate = Money::zero();
        f.store.save_vehicle(&free).await.unwrap();
        assert!(matches!(
            f.manager.create(user(), &f.vehicle.id, day(0), day(2)).await,
            Err(BookingError::ZeroCost { .. })
        ));

        let mut pricey = f.vehicle.clone();
        pricey.daily_rate = Money::from_decimal(Decimal::MAX / Decimal::from(10));
        f.store.save_vehicle(&pricey).await.unwrap();
        assert!(matches!(
            f.manager.create(user(), &f.vehicle.id, day(0), day(30)).await,
            Err(BookingError::PriceOverflow { days: 30, .. })
        ));

        assert!(f.manager.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = fixture().await;
        assert!(matches!(
            f.manager.create(user(), &f.vehicle.id, day(2), day(2)).await,
            Err(BookingError::InvalidInterval { .. })
        ));
        assert!(matches!(
            f.manager.create(user(), &VehicleId::new(), day(0), day(1)).await,
            Err(BookingError::VehicleNotFound { .. })
        ));
        assert!(f.manager.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlap_conflicts_until_canceled() {
        let f = fixture().await;
        let first = f
            .manager
            .create(user(), &f.vehicle.id, day(0), day(3))
            .await
            .unwrap();

        // Back-to-back windows share the boundary instant
        assert!(matches!(
            f.manager.create(user(), &f.vehicle.id, day(3), day(5)).await,
            Err(BookingError::BookingConflict { .. })
        ));

        f.manager.cancel(&first.id).await.unwrap();
        let second = f
            .manager
            .create(user(), &f.vehicle.id, day(1), day(2))
            .await
            .unwrap();
        assert_eq!(second.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn test_guarded_transitions() {
        let f = fixture().await;
        let reservation = f
            .manager
            .create(user(), &f.vehicle.id, day(0), day(1))
            .await
            .unwrap();

        assert!(matches!(
            f.manager.complete(&reservation.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
        f.manager.cancel(&reservation.id).await.unwrap();
        assert!(matches!(
            f.manager.confirm(&reservation.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
        assert!(matches!(
            f.manager.confirm(&ReservationId::new()).await,
            Err(BookingError::ReservationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rating_flow() {
        let f = fixture().await;
        let reservation = f
            .manager
            .create(user(), &f.vehicle.id, day(0), day(1))
            .await
            .unwrap();

        assert!(matches!(
            f.manager.rate(&reservation.id, 4, None).await,
            Err(BookingError::InvalidTransition { .. })
        ));

        f.manager.confirm(&reservation.id).await.unwrap();
        f.manager.complete(&reservation.id).await.unwrap();

        assert!(matches!(
            f.manager.rate(&reservation.id, 0, None).await,
            Err(BookingError::InvalidRating { value: 0 })
        ));

        let rated = f
            .manager
            .rate(&reservation.id, 4, Some("clean car".to_string()))
            .await
            .unwrap();
        assert_eq!(rated.rating.map(|r| r.value()), Some(4));
        assert_eq!(rated.feedback.as_deref(), Some("clean car"));

        let vehicle = f.store.get_vehicle(&f.vehicle.id).await.unwrap().unwrap();
        assert_eq!(vehicle.rating.count, 1);
        assert_eq!(vehicle.rating.mean, 4.0);

        assert!(matches!(
            f.manager.rate(&reservation.id, 5, None).await,
            Err(BookingError::AlreadyRated { .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_hooks() {
        let f = fixture().await;
        let reservation = f
            .manager
            .create(user(), &f.vehicle.id, day(0), day(1))
            .await
            .unwrap();

        let confirmed = f
            .manager
            .confirm_payment(&reservation.id, "pi_3Nx001".to_string())
            .await
            .unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(confirmed.payment_reference.as_deref(), Some("pi_3Nx001"));

        let refunded = f.manager.cancel_by_payment("pi_3Nx001").await.unwrap();
        assert_eq!(refunded.id, reservation.id);
        assert_eq!(refunded.status, ReservationStatus::Canceled);

        assert!(f
            .manager
            .cancel_by_payment("pi_unknown")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_payment_reference_belongs_to_one_reservation() {
        let f = fixture().await;
        let first = f
            .manager
            .create(user(), &f.vehicle.id, day(0), day(1))
            .await
            .unwrap();
        let second = f
            .manager
            .create(user(), &f.vehicle.id, day(2), day(3))
            .await
            .unwrap();

        f.manager
            .confirm_payment(&first.id, "pi_1".to_string())
            .await
            .unwrap();
        let err = f
            .manager
            .confirm_payment(&second.id, "pi_1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::PaymentReferenceInUse { .. }));
        assert!(err.is_recoverable());

        let untouched = f.manager.get(&second.id).await.unwrap();
        assert_eq!(untouched.status, ReservationStatus::Pending);
        assert_eq!(untouched.payment_reference, None);

        let refunded = f.manager.cancel_by_payment("pi_1").await.unwrap();
        assert_eq!(refunded.id, first.id);
        assert_eq!(
            f.manager.get(&second.id).await.unwrap().status,
            ReservationStatus::Pending
        );

        // A canceled booking keeps its reference
        assert!(matches!(
            f.manager.confirm_payment(&second.id, "pi_1".to_string()).await,
            Err(BookingError::PaymentReferenceInUse { .. })
        ));
        f.manager
            .confirm_payment(&second.id, "pi_2".to_string())
            .await
            .unwrap();
    }
}
