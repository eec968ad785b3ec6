use crate::domain::ratings::RatingAggregator;
use crate::domain::reservations::Reservation;
use crate::domain::types::{Rating, ReservationId, ReservationStatus, UserId, VehicleId, VehicleType};
use crate::domain::vehicles::Vehicle;
use crate::error::{BookingError, Result};
use crate::storage::{BookingStore, ReservationStore, VehicleStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;

type StartKey = (DateTime<Utc>, ReservationId);

#[derive(Default)]
struct State {
    vehicles: HashMap<VehicleId, Vehicle>,
    reservations: HashMap<ReservationId, Reservation>,
    /// Reservation ids per vehicle, ordered by start time
    by_vehicle: HashMap<VehicleId, BTreeSet<StartKey>>,
}

impl State {
    fn overlapping(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Vec<&Reservation> {
        let Some(keys) = self.by_vehicle.get(vehicle_id) else {
            return Vec::new();
        };
        keys.iter()
            .take_while(|(key_start, _)| *key_start <= end)
            .filter_map(|(_, id)| self.reservations.get(id))
            .filter(|r| r.window.end() >= start && r.status != exclude_status)
            .collect()
    }

    /// A payment reference may be held by one reservation only.
    fn check_payment_reference(&self, reservation: &Reservation) -> Result<()> {
        let Some(reference) = reservation.payment_reference.as_deref() else {
            return Ok(());
        };
        let taken = self
            .reservations
            .values()
            .any(|r| r.id != reservation.id && r.payment_reference.as_deref() == Some(reference));
        if taken {
            return Err(BookingError::PaymentReferenceInUse {
                reference: reference.to_string(),
            });
        }
        Ok(())
    }

    fn put_reservation(&mut self, reservation: Reservation) {
        if let Some(previous) = self.reservations.get(&reservation.id) {
            let key = (previous.window.start(), previous.id);
            if let Some(keys) = self.by_vehicle.get_mut(&previous.vehicle_id) {
                keys.remove(&key);
            }
        }
        self.by_vehicle
            .entry(reservation.vehicle_id)
            .or_default()
            .insert((reservation.window.start(), reservation.id));
        self.reservations.insert(reservation.id, reservation);
    }

    fn reservations_where(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.window
                .start()
                .cmp(&b.window.start())
                .then_with(|| a.id.cmp(&b.id))
        });
        found
    }

    fn vehicles_where(&self, keep: impl Fn(&Vehicle) -> bool) -> Vec<Vehicle> {
        let mut found: Vec<Vehicle> = self.vehicles.values().filter(|v| keep(v)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found
    }
}

/// Process-local store. A single lock covers vehicles and reservations so
/// every compound write is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleStore for InMemoryStore {
    async fn get_vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>> {
        Ok(self.state.read().await.vehicles.get(id).cloned())
    }

    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let mut state = self.state.write().await;
        let mut stored = vehicle.clone();
        if let Some(existing) = state.vehicles.get(&vehicle.id) {
            stored.rating = existing.rating;
            stored.created_at = existing.created_at;
        }
        state.vehicles.insert(stored.id, stored);
        Ok(())
    }

    async fn find_by_type(&self, vehicle_type: VehicleType) -> Result<Vec<Vehicle>> {
        Ok(self
            .state
            .read()
            .await
            .vehicles_where(|v| v.vehicle_type == vehicle_type))
    }

    async fn find_available(&self) -> Result<Vec<Vehicle>> {
        Ok(self.state.read().await.vehicles_where(|v| v.available))
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        Ok(self.state.read().await.vehicles_where(|_| true))
    }

    async fn find_by_ids(&self, ids: &[VehicleId]) -> Result<Vec<Vehicle>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.vehicles.get(id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(id).cloned())
    }

    async fn save_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_payment_reference(reservation)?;
        state.put_reservation(reservation.clone());
        Ok(())
    }

    async fn find_by_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations_where(|r| r.vehicle_id == *vehicle_id))
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations_where(|r| r.user_id == *user_id))
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .values()
            .find(|r| r.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_reservations(&self) -> Result<Vec<Reservation>> {
        Ok(self.state.read().await.reservations_where(|_| true))
    }

    async fn find_overlapping(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .overlapping(vehicle_id, start, end, exclude_status)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn find_booked_vehicle_ids(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Result<Vec<VehicleId>> {
        let state = self.state.read().await;
        let booked: HashSet<VehicleId> = state
            .by_vehicle
            .keys()
            .filter(|id| !state.overlapping(id, start, end, exclude_status).is_empty())
            .copied()
            .collect();
        let mut booked: Vec<VehicleId> = booked.into_iter().collect();
        booked.sort();
        Ok(booked)
    }

    async fn update_if_status(
        &self,
        reservation: &Reservation,
        expected: ReservationStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let current = state
            .reservations
            .get(&reservation.id)
            .ok_or_else(|| BookingError::ReservationNotFound {
                id: reservation.id.to_string(),
            })?;
        if current.status != expected {
            return Ok(false);
        }
        state.check_payment_reference(reservation)?;
        state.put_reservation(reservation.clone());
        Ok(true)
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.vehicles.contains_key(&reservation.vehicle_id) {
            return Err(BookingError::VehicleNotFound {
                id: reservation.vehicle_id.to_string(),
            });
        }

        let window = reservation.window;
        let clashes = state.overlapping(
            &reservation.vehicle_id,
            window.start(),
            window.end(),
            ReservationStatus::Canceled,
        );
        if !clashes.is_empty() {
            return Err(BookingError::BookingConflict {
                vehicle_id: reservation.vehicle_id.to_string(),
                start: window.start(),
                end: window.end(),
            });
        }
        state.check_payment_reference(reservation)?;

        state.put_reservation(reservation.clone());
        Ok(())
    }

    async fn record_rating(
        &self,
        reservation_id: &ReservationId,
        rating: Rating,
        feedback: Option<String>,
    ) -> Result<(Reservation, Vehicle)> {
        let mut state = self.state.write().await;

        let mut reservation = state
            .reservations
            .get(reservation_id)
            .cloned()
            .ok_or_else(|| BookingError::ReservationNotFound {
                id: reservation_id.to_string(),
            })?;
        if reservation.status != ReservationStatus::Completed {
            return Err(BookingError::InvalidTransition {
                from: reservation.status.to_string(),
                to: "rated".to_string(),
            });
        }
        if reservation.rating.is_some() {
            return Err(BookingError::AlreadyRated {
                id: reservation_id.to_string(),
            });
        }

        let mut vehicle = state
            .vehicles
            .get(&reservation.vehicle_id)
            .cloned()
            .ok_or_else(|| BookingError::VehicleNotFound {
                id: reservation.vehicle_id.to_string(),
            })?;

        let now = Utc::now();
        reservation.rating = Some(rating);
        reservation.feedback = feedback;
        reservation.updated_at = now;
        vehicle.rating = RatingAggregator::apply(vehicle.rating, rating);
        vehicle.updated_at = now;

        state.put_reservation(reservation.clone());
        state.vehicles.insert(vehicle.id, vehicle.clone());
        Ok((reservation, vehicle))
    }

    async fn delete_vehicle_cascade(&self, vehicle_id: &VehicleId) -> Result<u64> {
        let mut state = self.state.write().await;
        if !state.vehicles.contains_key(vehicle_id) {
            return Err(BookingError::VehicleNotFound {
                id: vehicle_id.to_string(),
            });
        }

        let keys = state.by_vehicle.get(vehicle_id).cloned().unwrap_or_default();
        let active = keys
            .iter()
            .filter_map(|(_, id)| state.reservations.get(id))
            .filter(|r| r.is_active())
            .count();
        if active > 0 {
            return Err(BookingError::VehicleInUse {
                id: vehicle_id.to_string(),
                active,
            });
        }

        for (_, id) in &keys {
            state.reservations.remove(id);
        }
        state.by_vehicle.remove(vehicle_id);
        state.vehicles.remove(vehicle_id);
        Ok(keys.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Money, TimeWindow};
    use crate::domain::vehicles::NewVehicle;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn hour(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap() + Duration::hours(n)
    }

    fn vehicle(available: bool) -> Vehicle {
        Vehicle::new(NewVehicle {
            brand: "Fiat".to_string(),
            model: "Panda".to_string(),
            year: 2020,
            vehicle_type: VehicleType::Economy,
            license_plate: "PO 4242A".to_string(),
            seats: 4,
            fuel_type: None,
            color: None,
            daily_rate: dec!(79.90),
            available,
            position: None,
        })
        .unwrap()
    }

    fn reservation(vehicle_id: VehicleId, from: i64, to: i64) -> Reservation {
        Reservation::new(
            UserId::new("piotr"),
            vehicle_id,
            TimeWindow::new(hour(from), hour(to)).unwrap(),
            Money::from_decimal(dec!(79.90)),
        )
    }

    async fn store_with(vehicle: &Vehicle) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.save_vehicle(vehicle).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_rejects_overlap() {
        let car = vehicle(true);
        let store = store_with(&car).await;

        store.insert_reservation(&reservation(car.id, 10, 20)).await.unwrap();
        assert!(matches!(
            store.insert_reservation(&reservation(car.id, 20, 30)).await,
            Err(BookingError::BookingConflict { .. })
        ));
        assert!(matches!(
            store.insert_reservation(&reservation(car.id, 0, 10)).await,
            Err(BookingError::BookingConflict { .. })
        ));
        store.insert_reservation(&reservation(car.id, 21, 30)).await.unwrap();
        assert_eq!(store.list_reservations().await.unwrap().len(), 2);

        assert!(matches!(
            store.insert_reservation(&reservation(VehicleId::new(), 0, 1)).await,
            Err(BookingError::VehicleNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_overlap_query_ignores_excluded_status() {
        let car = vehicle(true);
        let store = store_with(&car).await;

        let mut canceled = reservation(car.id, 0, 48);
        canceled.status = ReservationStatus::Canceled;
        store.save_reservation(&canceled).await.unwrap();
        let live = reservation(car.id, 50, 60);
        store.save_reservation(&live).await.unwrap();

        let found = store
            .find_overlapping(&car.id, hour(10), hour(55), ReservationStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(found, vec![live.clone()]);

        let found = store
            .find_overlapping(&car.id, hour(61), hour(70), ReservationStatus::Canceled)
            .await
            .unwrap();
        assert!(found.is_empty());

        let booked = store
            .find_booked_vehicle_ids(hour(0), hour(100), ReservationStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(booked, vec![car.id]);
    }

    #[tokio::test]
    async fn test_update_if_status_is_compare_and_set() {
        let car = vehicle(true);
        let store = store_with(&car).await;
        let original = reservation(car.id, 0, 5);
        store.insert_reservation(&original).await.unwrap();

        let mut confirmed = original.clone();
        confirmed.status = ReservationStatus::Confirmed;
        assert!(store
            .update_if_status(&confirmed, ReservationStatus::Pending)
            .await
            .unwrap());

        let mut canceled = original.clone();
        canceled.status = ReservationStatus::Canceled;
        assert!(!store
            .update_if_status(&canceled, ReservationStatus::Pending)
            .await
            .unwrap());

        let stored = store.get_reservation(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_payment_reference_is_unique() {
        let car = vehicle(true);
        let store = store_with(&car).await;
        let first = reservation(car.id, 0, 5);
        let second = reservation(car.id, 10, 15);
        store.insert_reservation(&first).await.unwrap();
        store.insert_reservation(&second).await.unwrap();

        let mut paid = first.clone();
        paid.status = ReservationStatus::Confirmed;
        paid.payment_reference = Some("pi_1".to_string());
        assert!(store
            .update_if_status(&paid, ReservationStatus::Pending)
            .await
            .unwrap());

        let mut clash = second.clone();
        clash.status = ReservationStatus::Confirmed;
        clash.payment_reference = Some("pi_1".to_string());
        assert!(matches!(
            store.update_if_status(&clash, ReservationStatus::Pending).await,
            Err(BookingError::PaymentReferenceInUse { .. })
        ));
        assert!(matches!(
            store.save_reservation(&clash).await,
            Err(BookingError::PaymentReferenceInUse { .. })
        ));

        // Re-saving the holder is fine
        store.save_reservation(&paid).await.unwrap();

        let stored = store.get_reservation(&second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
        assert_eq!(stored.payment_reference, None);
        assert_eq!(
            store.find_by_payment_reference("pi_1").await.unwrap().map(|r| r.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn test_record_rating_requires_completed() {
        let car = vehicle(true);
        let store = store_with(&car).await;
        let mut booking = reservation(car.id, 0, 5);
        store.insert_reservation(&booking).await.unwrap();

        let five = Rating::new(5).unwrap();
        assert!(matches!(
            store.record_rating(&booking.id, five, None).await,
            Err(BookingError::InvalidTransition { .. })
        ));

        booking.status = ReservationStatus::Completed;
        store.save_reservation(&booking).await.unwrap();
        let (rated, rated_vehicle) = store.record_rating(&booking.id, five, None).await.unwrap();
        assert_eq!(rated.rating, Some(five));
        assert_eq!(rated_vehicle.rating.count, 1);

        assert!(matches!(
            store.record_rating(&booking.id, five, None).await,
            Err(BookingError::AlreadyRated { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_vehicle_keeps_rating_summary() {
        let car = vehicle(true);
        let store = store_with(&car).await;
        let mut booking = reservation(car.id, 0, 5);
        booking.status = ReservationStatus::Completed;
        store.save_reservation(&booking).await.unwrap();
        store
            .record_rating(&booking.id, Rating::new(3).unwrap(), None)
            .await
            .unwrap();

        let mut stale = car.clone();
        stale.available = false;
        store.save_vehicle(&stale).await.unwrap();

        let stored = store.get_vehicle(&car.id).await.unwrap().unwrap();
        assert!(!stored.available);
        assert_eq!(stored.rating.count, 1);
        assert_eq!(stored.rating.mean, 3.0);
    }

    #[tokio::test]
    async fn test_delete_cascade() {
        let car = vehicle(false);
        let store = store_with(&car).await;
        let pending = reservation(car.id, 0, 5);
        store.insert_reservation(&pending).await.unwrap();

        assert!(matches!(
            store.delete_vehicle_cascade(&car.id).await,
            Err(BookingError::VehicleInUse { active: 1, .. })
        ));

        let mut done = pending.clone();
        done.status = ReservationStatus::Canceled;
        store.save_reservation(&done).await.unwrap();

        assert_eq!(store.delete_vehicle_cascade(&car.id).await.unwrap(), 1);
        assert!(store.get_vehicle(&car.id).await.unwrap().is_none());
        assert!(store.get_reservation(&pending.id).await.unwrap().is_none());
        assert!(store.find_available().await.unwrap().is_empty());
    }
}
