pub mod availability;
pub mod geo;
pub mod locks;
pub mod pricing;
pub mod ratings;
pub mod reservations;
pub mod types;
pub mod vehicles;

pub use availability::AvailabilityChecker;
pub use geo::{haversine_km, GeoIndex};
pub use locks::{VehicleGuard, VehicleLocks};
pub use pricing::PricingEngine;
pub use ratings::{RatingAggregator, RatingSummary};
pub use reservations::{Reservation, ReservationManager, ReservationOperations};
pub use types::*;
pub use vehicles::{NearbyVehicle, NewVehicle, Vehicle, VehicleCatalog};
