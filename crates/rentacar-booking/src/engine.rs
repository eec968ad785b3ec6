//! Entry point for the presentation layer
//!
//! [`BookingEngine`] owns one instance of every component, all sharing the
//! same store and per-vehicle locks.

use crate::config::{BookingConfig, StorageBackend};
use crate::domain::locks::VehicleLocks;
use crate::domain::pricing::PricingEngine;
use crate::domain::reservations::{Reservation, ReservationManager, ReservationOperations};
use crate::domain::types::{Money, TimeWindow, UserId, VehicleId, VehicleType};
use crate::domain::vehicles::{NearbyVehicle, Vehicle, VehicleCatalog};
use crate::error::{BookingError, Result};
use crate::storage::{BookingStore, InMemoryStore, PgBookingStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub vehicle_id: VehicleId,
    pub window: TimeWindow,
    pub billable_days: i64,
    pub daily_rate: Money,
    pub total_cost: Money,
}

/// Search filter for [`BookingEngine::book_nearest`]
#[derive(Debug, Clone)]
pub struct NearestRequest {
    pub user_id: UserId,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub vehicle_type: Option<VehicleType>,
}

pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
    catalog: VehicleCatalog,
    reservations: ReservationManager,
}

impl BookingEngine {
    pub fn new(config: &BookingConfig, store: Arc<dyn BookingStore>) -> Self {
        let locks = Arc::new(VehicleLocks::new(config.booking.lock_timeout()));
        let catalog = VehicleCatalog::new(store.clone(), locks.clone(), config.geo.clone());
        let reservations =
            ReservationManager::new(store.clone(), PricingEngine::new(&config.pricing), locks);

        Self {
            store,
            catalog,
            reservations,
        }
    }

    /// Open the configured backend and load the proximity index from it.
    pub async fn connect(config: &BookingConfig) -> Result<Self> {
        let store: Arc<dyn BookingStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
            StorageBackend::Postgres => Arc::new(PgBookingStore::connect(&config.database).await?),
        };
        info!("Using {:?} storage backend", config.storage.backend);

        let engine = Self::new(config, store);
        engine.catalog.rebuild_index().await?;
        Ok(engine)
    }

    pub fn store(&self) -> Arc<dyn BookingStore> {
        self.store.clone()
    }

    pub fn catalog(&self) -> &VehicleCatalog {
        &self.catalog
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    /// Price a booking without reserving anything.
    pub async fn quote(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Quote> {
        let window = TimeWindow::new(start, end)?;
        let vehicle = self.catalog.get(vehicle_id).await?;
        let pricing = self.reservations.pricing();

        Ok(Quote {
            vehicle_id: vehicle.id,
            window,
            billable_days: pricing.billable_days(&window),
            daily_rate: vehicle.daily_rate,
            total_cost: pricing.price(vehicle.daily_rate, &window)?,
        })
    }

    pub async fn free_vehicles(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Vehicle>> {
        let window = TimeWindow::new(start, end)?;
        self.reservations.checker().free_vehicles(&window).await
    }

    /// Book the closest available vehicle that is free for the window.
    /// Returns `None` when every candidate in range is taken or unpriced.
    pub async fn book_nearest(&self, request: NearestRequest) -> Result<Option<(Reservation, NearbyVehicle)>> {
        TimeWindow::new(request.start, request.end)?;

        let candidates = self
            .catalog
            .nearby(request.latitude, request.longitude, request.radius_km)
            .await?
            .into_iter()
            .filter(|n| n.vehicle.available)
            .filter(|n| request.vehicle_type.map_or(true, |t| n.vehicle.vehicle_type == t));

        for candidate in candidates {
            let vehicle_id = candidate.vehicle.id;
            let outcome = self
                .reservations
                .create(request.user_id.clone(), &vehicle_id, request.start, request.end)
                .await;
            match outcome {
                Ok(reservation) => return Ok(Some((reservation, candidate))),
                Err(BookingError::BookingConflict { .. }) => {
                    debug!(
                        "Vehicle {} at {:.2}km is taken, trying the next one",
                        vehicle_id, candidate.distance_km
                    );
                }
                Err(BookingError::ZeroCost { .. }) => {
                    debug!("Vehicle {} has no rate set, skipping", vehicle_id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}
