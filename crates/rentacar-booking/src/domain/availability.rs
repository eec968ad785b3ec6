use crate::domain::reservations::Reservation;
use crate::domain::types::{ReservationStatus, TimeWindow, VehicleId};
use crate::domain::vehicles::Vehicle;
use crate::error::Result;
use crate::storage::BookingStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Answers whether a vehicle is free for a window. Canceled reservations
/// never block; boundaries are inclusive, so a booking ending at 10:00
/// conflicts with one starting at 10:00.
#[derive(Clone)]
pub struct AvailabilityChecker {
    store: Arc<dyn BookingStore>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn conflicts(&self, vehicle_id: &VehicleId, window: &TimeWindow) -> Result<Vec<Reservation>> {
        self.store
            .find_overlapping(
                vehicle_id,
                window.start(),
                window.end(),
                ReservationStatus::Canceled,
            )
            .await
    }

    pub async fn has_overlap(&self, vehicle_id: &VehicleId, window: &TimeWindow) -> Result<bool> {
        let conflicts = self.conflicts(vehicle_id, window).await?;
        if !conflicts.is_empty() {
            debug!(
                "Vehicle {} has {} reservations overlapping {}",
                vehicle_id,
                conflicts.len(),
                window
            );
        }
        Ok(!conflicts.is_empty())
    }

    /// Vehicles flagged available with no live reservation in `window`.
    pub async fn free_vehicles(&self, window: &TimeWindow) -> Result<Vec<Vehicle>> {
        let booked: HashSet<VehicleId> = self
            .store
            .find_booked_vehicle_ids(window.start(), window.end(), ReservationStatus::Canceled)
            .await?
            .into_iter()
            .collect();

        let free = self
            .store
            .find_available()
            .await?
            .into_iter()
            .filter(|vehicle| !booked.contains(&vehicle.id))
            .collect();
        Ok(free)
    }
}
