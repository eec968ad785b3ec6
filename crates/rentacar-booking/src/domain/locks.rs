use crate::domain::types::VehicleId;
use crate::error::{BookingError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Per-vehicle mutual exclusion for check-then-write sequences.
///
/// Guards are owned so they can be held across awaits on the store; the
/// lock is released when the guard is dropped.
pub struct VehicleLocks {
    locks: DashMap<VehicleId, Arc<Mutex<()>>>,
    timeout: Duration,
}

pub struct VehicleGuard {
    vehicle_id: VehicleId,
    _guard: OwnedMutexGuard<()>,
}

impl VehicleGuard {
    pub fn vehicle_id(&self) -> VehicleId {
        self.vehicle_id
    }
}

impl Drop for VehicleGuard {
    fn drop(&mut self) {
        debug!("Released booking lock for vehicle {}", self.vehicle_id);
    }
}

impl VehicleLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    pub async fn acquire(&self, vehicle_id: &VehicleId) -> Result<VehicleGuard> {
        let lock = self.locks.entry(*vehicle_id).or_default().clone();

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!("Acquired booking lock for vehicle {}", vehicle_id);
                Ok(VehicleGuard {
                    vehicle_id: *vehicle_id,
                    _guard: guard,
                })
            }
            Err(_) => {
                warn!(
                    "Timed out waiting {}ms for booking lock on vehicle {}",
                    self.timeout.as_millis(),
                    vehicle_id
                );
                Err(BookingError::LockTimeout {
                    vehicle_id: vehicle_id.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Forget the lock of a deleted vehicle. Callers must hold its guard.
    pub fn forget(&self, vehicle_id: &VehicleId) {
        self.locks.remove(vehicle_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let locks = Arc::new(VehicleLocks::new(Duration::from_secs(1)));
        let vehicle = VehicleId::new();

        let guard = locks.acquire(&vehicle).await.unwrap();

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(&vehicle).await.map(|g| g.vehicle_id()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert_eq!(contender.await.unwrap().unwrap(), vehicle);
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let locks = VehicleLocks::new(Duration::from_millis(20));
        let vehicle = VehicleId::new();

        let _held = locks.acquire(&vehicle).await.unwrap();
        let result = locks.acquire(&vehicle).await;
        assert!(matches!(
            result,
            Err(BookingError::LockTimeout { timeout_ms: 20, .. })
        ));
    }

    #[tokio::test]
    async fn test_distinct_vehicles_do_not_contend() {
        let locks = VehicleLocks::new(Duration::from_millis(20));
        let _a = locks.acquire(&VehicleId::new()).await.unwrap();
        assert!(locks.acquire(&VehicleId::new()).await.is_ok());
    }
}
