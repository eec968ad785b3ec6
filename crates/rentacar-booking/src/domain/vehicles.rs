use crate::config::GeoConfig;
use crate::domain::geo::{haversine_km, GeoIndex};
use crate::domain::locks::VehicleLocks;
use crate::domain::ratings::RatingSummary;
use crate::domain::types::{GeoPoint, Money, VehicleId, VehicleType, MAX_AMOUNT};
use crate::error::{BookingError, Result};
use crate::storage::BookingStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub vehicle_type: VehicleType,
    pub license_plate: String,
    pub seats: i32,
    pub fuel_type: Option<String>,
    pub color: Option<String>,
    pub daily_rate: Money,
    pub available: bool,
    pub position: Option<GeoPoint>,
    pub rating: RatingSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog entry as submitted by fleet management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVehicle {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub vehicle_type: VehicleType,
    pub license_plate: String,
    pub seats: i32,
    pub fuel_type: Option<String>,
    pub color: Option<String>,
    pub daily_rate: Decimal,
    pub available: bool,
    pub position: Option<GeoPoint>,
}

impl Vehicle {
    pub fn new(listing: NewVehicle) -> Result<Self> {
        let daily_rate = validated_rate(listing.daily_rate)?;
        let now = Utc::now();
        Ok(Self {
            id: VehicleId::new(),
            brand: listing.brand,
            model: listing.model,
            year: listing.year,
            vehicle_type: listing.vehicle_type,
            license_plate: listing.license_plate,
            seats: listing.seats,
            fuel_type: listing.fuel_type,
            color: listing.color,
            daily_rate,
            available: listing.available,
            position: listing.position,
            rating: RatingSummary::unrated(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn display_name(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.license_plate)
    }
}

fn validated_rate(rate: Decimal) -> Result<Money> {
    let money = Money::from_decimal(rate);
    if money.is_negative() || money.as_decimal() > MAX_AMOUNT {
        return Err(BookingError::InvalidRate { rate });
    }
    Ok(money)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyVehicle {
    pub vehicle: Vehicle,
    pub distance_km: f64,
}

/// Vehicle lookup, fleet management and proximity search.
///
/// The proximity index is local to this process. Every write made through
/// the catalog keeps it current; writes made elsewhere become visible after
/// [`VehicleCatalog::rebuild_index`].
pub struct VehicleCatalog {
    store: Arc<dyn BookingStore>,
    locks: Arc<VehicleLocks>,
    index: RwLock<GeoIndex>,
    geo_config: GeoConfig,
}

impl VehicleCatalog {
    pub fn new(store: Arc<dyn BookingStore>, locks: Arc<VehicleLocks>, geo_config: GeoConfig) -> Self {
        Self {
            store,
            locks,
            index: RwLock::new(GeoIndex::new(&geo_config)),
            geo_config,
        }
    }

    pub async fn rebuild_index(&self) -> Result<usize> {
        let vehicles = self.store.list_vehicles().await?;
        let mut fresh = GeoIndex::new(&self.geo_config);
        for vehicle in &vehicles {
            if let Some(position) = vehicle.position {
                fresh.insert(vehicle.id, position);
            }
        }
        let indexed = fresh.len();
        *self.index.write().await = fresh;

        info!(
            "Rebuilt proximity index: {} of {} vehicles have a position",
            indexed,
            vehicles.len()
        );
        Ok(indexed)
    }

    pub async fn get(&self, id: &VehicleId) -> Result<Vehicle> {
        self.store
            .get_vehicle(id)
            .await?
            .ok_or_else(|| BookingError::VehicleNotFound { id: id.to_string() })
    }

    pub async fn all(&self) -> Result<Vec<Vehicle>> {
        self.store.list_vehicles().await
    }

    pub async fn by_type(&self, vehicle_type: VehicleType) -> Result<Vec<Vehicle>> {
        self.store.find_by_type(vehicle_type).await
    }

    pub async fn available(&self) -> Result<Vec<Vehicle>> {
        self.store.find_available().await
    }

    pub async fn add(&self, listing: NewVehicle) -> Result<Vehicle> {
        let vehicle = Vehicle::new(listing)?;
        self.store.save_vehicle(&vehicle).await?;
        self.sync_index(&vehicle).await;

        info!("Added vehicle {} as {}", vehicle.display_name(), vehicle.id);
        Ok(vehicle)
    }

    /// Replace the descriptive fields, rate, availability and position of a
    /// catalog entry. A missing position keeps the stored one; use
    /// [`VehicleCatalog::clear_position`] to drop it. The rating summary and
    /// creation time are never taken from the caller.
    pub async fn update(&self, vehicle: Vehicle) -> Result<Vehicle> {
        let daily_rate = validated_rate(vehicle.daily_rate.as_decimal())?;
        let id = vehicle.id;
        self.modify(&id, move |current| {
            current.brand = vehicle.brand;
            current.model = vehicle.model;
            current.year = vehicle.year;
            current.vehicle_type = vehicle.vehicle_type;
            current.license_plate = vehicle.license_plate;
            current.seats = vehicle.seats;
            current.fuel_type = vehicle.fuel_type;
            current.color = vehicle.color;
            current.daily_rate = daily_rate;
            current.available = vehicle.available;
            if vehicle.position.is_some() {
                current.position = vehicle.position;
            }
            Ok(())
        })
        .await
    }

    pub async fn relocate(&self, id: &VehicleId, latitude: f64, longitude: f64) -> Result<Vehicle> {
        let position = GeoPoint::new(latitude, longitude)?;
        self.modify(id, move |vehicle| {
            vehicle.position = Some(position);
            Ok(())
        })
        .await
    }

    /// Forget the vehicle's position, taking it out of proximity search.
    pub async fn clear_position(&self, id: &VehicleId) -> Result<Vehicle> {
        self.modify(id, |vehicle| {
            vehicle.position = None;
            Ok(())
        })
        .await
    }

    pub async fn set_availability(&self, id: &VehicleId, available: bool) -> Result<Vehicle> {
        self.modify(id, move |vehicle| {
            vehicle.available = available;
            Ok(())
        })
        .await
    }

    pub async fn set_daily_rate(&self, id: &VehicleId, rate: Decimal) -> Result<Vehicle> {
        let daily_rate = validated_rate(rate)?;
        self.modify(id, move |vehicle| {
            vehicle.daily_rate = daily_rate;
            Ok(())
        })
        .await
    }

    /// Delete a vehicle and its reservation history.
    pub async fn delete(&self, id: &VehicleId) -> Result<u64> {
        let _guard = self.locks.acquire(id).await?;
        let removed = self.store.delete_vehicle_cascade(id).await?;
        self.index.write().await.remove(id);
        self.locks.forget(id);

        info!(
            "Deleted vehicle {} with {} historical reservations",
            id, removed
        );
        Ok(removed)
    }

    /// Vehicles within `radius_km` of the given point, nearest first.
    pub async fn nearby(&self, latitude: f64, longitude: f64, radius_km: f64) -> Result<Vec<NearbyVehicle>> {
        let center = GeoPoint::new(latitude, longitude)?;
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(BookingError::InvalidRadius { radius_km });
        }

        let hits = self.index.read().await.within(center, radius_km);
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<VehicleId> = hits.iter().map(|(id, _)| *id).collect();
        let mut by_id: HashMap<VehicleId, Vehicle> = self
            .store
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();

        // Positions are re-read from the store in case the index is stale.
        let mut nearby: Vec<NearbyVehicle> = ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .filter_map(|vehicle| {
                let distance_km = haversine_km(center, vehicle.position?);
                (distance_km <= radius_km).then_some(NearbyVehicle {
                    vehicle,
                    distance_km,
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

        debug!(
            "Found {} vehicles within {}km of ({}, {})",
            nearby.len(),
            radius_km,
            latitude,
            longitude
        );
        Ok(nearby)
    }

    async fn modify<F>(&self, id: &VehicleId, change: F) -> Result<Vehicle>
    where
        F: FnOnce(&mut Vehicle) -> Result<()> + Send,
    {
        let _guard = self.locks.acquire(id).await?;
        let mut vehicle = self.get(id).await?;
        change(&mut vehicle)?;
        vehicle.updated_at = Utc::now();
        self.store.save_vehicle(&vehicle).await?;
        self.sync_index(&vehicle).await;

        debug!("Updated vehicle {}", vehicle.id);
        Ok(vehicle)
    }

    async fn sync_index(&self, vehicle: &Vehicle) {
        let mut index = self.index.write().await;
        match vehicle.position {
            Some(position) => index.insert(vehicle.id, position),
            None => {
                index.remove(&vehicle.id);
            }
        }
    }
}
