use crate::config::PricingConfig;
use crate::domain::types::{Money, TimeWindow};
use crate::error::{BookingError, Result};

/// Daily-rate pricing: whole elapsed days, never fewer than the configured
/// minimum.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    minimum_days: i64,
}

impl PricingEngine {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            minimum_days: config.minimum_billable_days.max(1),
        }
    }

    pub fn billable_days(&self, window: &TimeWindow) -> i64 {
        window.duration().num_days().max(self.minimum_days)
    }

    pub fn price(&self, daily_rate: Money, window: &TimeWindow) -> Result<Money> {
        let days = self.billable_days(window);
        daily_rate
            .times(days)
            .ok_or_else(|| BookingError::PriceOverflow {
                daily_rate: daily_rate.as_decimal(),
                days,
            })
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(&PricingConfig::default())
    }
}
