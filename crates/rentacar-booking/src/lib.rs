pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod storage;

pub use config::BookingConfig;
pub use engine::{BookingEngine, NearestRequest, Quote};
pub use error::{BookingError, Result};
