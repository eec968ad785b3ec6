use crate::domain::reservations::Reservation;
use crate::domain::types::{Rating, ReservationId, ReservationStatus, UserId, VehicleId, VehicleType};
use crate::domain::vehicles::Vehicle;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgBookingStore;

#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn get_vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>>;
    /// Insert or replace a catalog entry. For an existing vehicle the stored
    /// rating summary is kept; only `BookingStore::record_rating` changes it.
    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()>;
    async fn find_by_type(&self, vehicle_type: VehicleType) -> Result<Vec<Vehicle>>;
    async fn find_available(&self) -> Result<Vec<Vehicle>>;
    async fn list_vehicles(&self) -> Result<Vec<Vehicle>>;
    async fn find_by_ids(&self, ids: &[VehicleId]) -> Result<Vec<Vehicle>>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>>;
    async fn save_reservation(&self, reservation: &Reservation) -> Result<()>;
    async fn find_by_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Reservation>>;
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Reservation>>;
    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Reservation>>;
    async fn list_reservations(&self) -> Result<Vec<Reservation>>;

    /// Reservations of `vehicle_id` whose window overlaps `[start, end]`
    /// inclusively, ignoring those in `exclude_status`.
    async fn find_overlapping(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Result<Vec<Reservation>>;

    /// Distinct vehicles holding an overlapping reservation not in
    /// `exclude_status`.
    async fn find_booked_vehicle_ids(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Result<Vec<VehicleId>>;

    /// Write `reservation` only if the stored copy is still in `expected`.
    /// Returns `false` when another writer got there first.
    async fn update_if_status(
        &self,
        reservation: &Reservation,
        expected: ReservationStatus,
    ) -> Result<bool>;
}

/// Compound writes that must be atomic against the backing store.
#[async_trait]
pub trait BookingStore: VehicleStore + ReservationStore {
    /// Insert a new reservation unless a non-canceled reservation of the
    /// same vehicle overlaps it, in which case `BookingConflict` is returned
    /// and nothing is written.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Attach `rating` and `feedback` to a completed, unrated reservation and
    /// fold the rating into its vehicle's summary in one unit. Returns the
    /// updated reservation and vehicle.
    async fn record_rating(
        &self,
        reservation_id: &ReservationId,
        rating: Rating,
        feedback: Option<String>,
    ) -> Result<(Reservation, Vehicle)>;

    /// Remove a vehicle together with its reservation history. Fails with
    /// `VehicleInUse` while pending or confirmed reservations remain.
    async fn delete_vehicle_cascade(&self, vehicle_id: &VehicleId) -> Result<u64>;
}
