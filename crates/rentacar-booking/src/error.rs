use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Vehicle {vehicle_id} is already booked between {start} and {end}")]
    BookingConflict {
        vehicle_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid interval: end {end} is not after start {start}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid rating {value}: must be between 1 and 5")]
    InvalidRating { value: i64 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Vehicle not found: {id}")]
    VehicleNotFound { id: String },

    #[error("Reservation not found: {id}")]
    ReservationNotFound { id: String },

    #[error("Reservation {id} has already been rated")]
    AlreadyRated { id: String },

    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Invalid search radius: {radius_km} km")]
    InvalidRadius { radius_km: f64 },

    #[error("Invalid daily rate: {rate}")]
    InvalidRate { rate: Decimal },

    #[error("Cost of {days} days at {daily_rate} per day overflows")]
    PriceOverflow { daily_rate: Decimal, days: i64 },

    #[error("Vehicle {vehicle_id} would be booked at no cost")]
    ZeroCost { vehicle_id: String },

    #[error("Payment reference {reference} is already attached to another reservation")]
    PaymentReferenceInUse { reference: String },

    #[error("Vehicle {id} still has {active} pending or confirmed reservations")]
    VehicleInUse { id: String, active: usize },

    #[error("Timed out after {timeout_ms}ms waiting for vehicle {vehicle_id}")]
    LockTimeout { vehicle_id: String, timeout_ms: u64 },

    #[error("Database error during {operation}: {source}")]
    DatabaseError {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error: {0}")]
    Configuration(#[from] rentacar_common::ConfigurationError),
}

impl BookingError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BookingError::VehicleNotFound { .. } | BookingError::ReservationNotFound { .. }
        )
    }

    /// Domain errors can be reported back to the caller; storage and
    /// configuration failures cannot.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            BookingError::DatabaseError { .. } | BookingError::Configuration(_)
        )
    }

    pub(crate) fn database(
        operation: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BookingError::DatabaseError {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
