use crate::config::DatabaseConfig;
use crate::domain::ratings::{RatingAggregator, RatingSummary};
use crate::domain::reservations::Reservation;
use crate::domain::types::{
    GeoPoint, Money, Rating, ReservationId, ReservationStatus, TimeWindow, UserId, VehicleId,
    VehicleType,
};
use crate::domain::vehicles::Vehicle;
use crate::error::{BookingError, Result};
use crate::storage::{BookingStore, ReservationStore, VehicleStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const VEHICLE_COLUMNS: &str = "vehicle_id, brand, model, year, vehicle_type, license_plate, seats, \
     fuel_type, color, daily_rate, available, latitude, longitude, rating_mean, rating_count, \
     created_at, updated_at";

const RESERVATION_COLUMNS: &str = "reservation_id, vehicle_id, user_id, start_time, end_time, \
     total_cost, status, rating, feedback, payment_reference, created_at, updated_at";

/// SQLSTATE raised by the `reservations_no_overlap` exclusion constraint
const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";
const PAYMENT_REFERENCE_INDEX: &str = "idx_reservations_payment_reference";

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| BookingError::database("connect", e))?;

        info!(
            "Connected to PostgreSQL (max {} connections)",
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BookingError::database("run_migrations", e))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'_, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| BookingError::database(operation, e))
    }

    async fn lock_vehicle(
        tx: &mut Transaction<'_, Postgres>,
        vehicle_id: &VehicleId,
    ) -> Result<Vehicle> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(vehicle_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| BookingError::database("lock_vehicle", e))?
            .ok_or_else(|| BookingError::VehicleNotFound {
                id: vehicle_id.to_string(),
            })?;
        vehicle_from_row(&row)
    }

    async fn fetch_vehicles(&self, operation: &str, sql: &str) -> Result<Vec<Vehicle>> {
        sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database(operation, e))?
            .iter()
            .map(vehicle_from_row)
            .collect()
    }
}

fn is_exclusion_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == EXCLUSION_VIOLATION)
}

fn is_payment_reference_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().is_some_and(|db| {
        db.code().is_some_and(|code| code == UNIQUE_VIOLATION)
            && db.constraint() == Some(PAYMENT_REFERENCE_INDEX)
    })
}

/// Maps constraint violations on a reservation write to domain errors.
fn reservation_write_error(operation: &str, reservation: &Reservation, e: sqlx::Error) -> BookingError {
    if is_exclusion_violation(&e) {
        return conflict(reservation);
    }
    if is_payment_reference_violation(&e) {
        return BookingError::PaymentReferenceInUse {
            reference: reservation.payment_reference.clone().unwrap_or_default(),
        };
    }
    BookingError::database(operation, e)
}

fn conflict(reservation: &Reservation) -> BookingError {
    BookingError::BookingConflict {
        vehicle_id: reservation.vehicle_id.to_string(),
        start: reservation.window.start(),
        end: reservation.window.end(),
    }
}

fn decode(e: sqlx::Error) -> BookingError {
    BookingError::database("decode_row", e)
}

fn invalid_column(column: &str, reason: String) -> BookingError {
    BookingError::DatabaseError {
        operation: format!("decode_{column}"),
        source: reason.into(),
    }
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle> {
    let vehicle_type: String = row.try_get("vehicle_type").map_err(decode)?;
    let latitude: Option<f64> = row.try_get("latitude").map_err(decode)?;
    let longitude: Option<f64> = row.try_get("longitude").map_err(decode)?;
    let rating_count: i32 = row.try_get("rating_count").map_err(decode)?;

    Ok(Vehicle {
        id: VehicleId::from_uuid(row.try_get("vehicle_id").map_err(decode)?),
        brand: row.try_get("brand").map_err(decode)?,
        model: row.try_get("model").map_err(decode)?,
        year: row.try_get("year").map_err(decode)?,
        vehicle_type: vehicle_type
            .parse::<VehicleType>()
            .map_err(|e| invalid_column("vehicle_type", e))?,
        license_plate: row.try_get("license_plate").map_err(decode)?,
        seats: row.try_get("seats").map_err(decode)?,
        fuel_type: row.try_get("fuel_type").map_err(decode)?,
        color: row.try_get("color").map_err(decode)?,
        daily_rate: Money::from_decimal(row.try_get("daily_rate").map_err(decode)?),
        available: row.try_get("available").map_err(decode)?,
        position: latitude
            .zip(longitude)
            .map(|(latitude, longitude)| GeoPoint {
                latitude,
                longitude,
            }),
        rating: RatingSummary {
            mean: row.try_get("rating_mean").map_err(decode)?,
            count: rating_count.max(0) as u32,
        },
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    let status: String = row.try_get("status").map_err(decode)?;
    let rating: Option<i16> = row.try_get("rating").map_err(decode)?;
    let start: DateTime<Utc> = row.try_get("start_time").map_err(decode)?;
    let end: DateTime<Utc> = row.try_get("end_time").map_err(decode)?;
    let user_id: String = row.try_get("user_id").map_err(decode)?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get("reservation_id").map_err(decode)?),
        user_id: UserId::new(user_id),
        vehicle_id: VehicleId::from_uuid(row.try_get("vehicle_id").map_err(decode)?),
        window: TimeWindow::new(start, end)?,
        total_cost: Money::from_decimal(row.try_get("total_cost").map_err(decode)?),
        status: status
            .parse::<ReservationStatus>()
            .map_err(|e| invalid_column("status", e))?,
        rating: rating.map(|r| Rating::new(i64::from(r))).transpose()?,
        feedback: row.try_get("feedback").map_err(decode)?,
        payment_reference: row.try_get("payment_reference").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[async_trait]
impl VehicleStore for PgBookingStore {
    async fn get_vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BookingError::database("get_vehicle", e))?
            .as_ref()
            .map(vehicle_from_row)
            .transpose()
    }

    /// Upsert everything but the rating summary, which only
    /// `record_rating` writes.
    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let (latitude, longitude) = match vehicle.position {
            Some(p) => (Some(p.latitude), Some(p.longitude)),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO vehicles
                (vehicle_id, brand, model, year, vehicle_type, license_plate, seats,
                 fuel_type, color, daily_rate, available, latitude, longitude,
                 rating_mean, rating_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (vehicle_id) DO UPDATE SET
                brand = EXCLUDED.brand,
                model = EXCLUDED.model,
                year = EXCLUDED.year,
                vehicle_type = EXCLUDED.vehicle_type,
                license_plate = EXCLUDED.license_plate,
                seats = EXCLUDED.seats,
                fuel_type = EXCLUDED.fuel_type,
                color = EXCLUDED.color,
                daily_rate = EXCLUDED.daily_rate,
                available = EXCLUDED.available,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(vehicle.id.as_uuid())
        .bind(&vehicle.brand)
        .bind(&vehicle.model)
        .bind(vehicle.year)
        .bind(vehicle.vehicle_type.to_string())
        .bind(&vehicle.license_plate)
        .bind(vehicle.seats)
        .bind(&vehicle.fuel_type)
        .bind(&vehicle.color)
        .bind(vehicle.daily_rate.as_decimal())
        .bind(vehicle.available)
        .bind(latitude)
        .bind(longitude)
        .bind(vehicle.rating.mean)
        .bind(vehicle.rating.count as i32)
        .bind(vehicle.created_at)
        .bind(vehicle.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| BookingError::database("save_vehicle", e))?;

        Ok(())
    }

    async fn find_by_type(&self, vehicle_type: VehicleType) -> Result<Vec<Vehicle>> {
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_type = $1 \
             ORDER BY created_at, vehicle_id"
        );
        sqlx::query(&sql)
            .bind(vehicle_type.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("find_by_type", e))?
            .iter()
            .map(vehicle_from_row)
            .collect()
    }

    async fn find_available(&self) -> Result<Vec<Vehicle>> {
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE available ORDER BY created_at, vehicle_id"
        );
        self.fetch_vehicles("find_available", &sql).await
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles ORDER BY created_at, vehicle_id");
        self.fetch_vehicles("list_vehicles", &sql).await
    }

    async fn find_by_ids(&self, ids: &[VehicleId]) -> Result<Vec<Vehicle>> {
        let uuids: Vec<Uuid> = ids.iter().map(VehicleId::as_uuid).collect();
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = ANY($1)");
        sqlx::query(&sql)
            .bind(uuids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("find_by_ids", e))?
            .iter()
            .map(vehicle_from_row)
            .collect()
    }
}

#[async_trait]
impl ReservationStore for PgBookingStore {
    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BookingError::database("get_reservation", e))?
            .as_ref()
            .map(reservation_from_row)
            .transpose()
    }

    async fn save_reservation(&self, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations
                (reservation_id, vehicle_id, user_id, start_time, end_time, total_cost,
                 status, rating, feedback, payment_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (reservation_id) DO UPDATE SET
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                total_cost = EXCLUDED.total_cost,
                status = EXCLUDED.status,
                rating = EXCLUDED.rating,
                feedback = EXCLUDED.feedback,
                payment_reference = EXCLUDED.payment_reference,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.vehicle_id.as_uuid())
        .bind(reservation.user_id.as_str())
        .bind(reservation.window.start())
        .bind(reservation.window.end())
        .bind(reservation.total_cost.as_decimal())
        .bind(reservation.status.to_string())
        .bind(reservation.rating.map(|r| i16::from(r.value())))
        .bind(&reservation.feedback)
        .bind(&reservation.payment_reference)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| reservation_write_error("save_reservation", reservation, e))?;

        Ok(())
    }

    async fn find_by_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE vehicle_id = $1 \
             ORDER BY start_time, reservation_id"
        );
        sqlx::query(&sql)
            .bind(vehicle_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("find_by_vehicle", e))?
            .iter()
            .map(reservation_from_row)
            .collect()
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE user_id = $1 \
             ORDER BY start_time, reservation_id"
        );
        sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("find_by_user", e))?
            .iter()
            .map(reservation_from_row)
            .collect()
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE payment_reference = $1"
        );
        sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BookingError::database("find_by_payment_reference", e))?
            .as_ref()
            .map(reservation_from_row)
            .transpose()
    }

    async fn list_reservations(&self) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations ORDER BY start_time, reservation_id"
        );
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("list_reservations", e))?
            .iter()
            .map(reservation_from_row)
            .collect()
    }

    async fn find_overlapping(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE vehicle_id = $1 AND start_time <= $3 AND end_time >= $2 AND status <> $4 \
             ORDER BY start_time"
        );
        sqlx::query(&sql)
            .bind(vehicle_id.as_uuid())
            .bind(start)
            .bind(end)
            .bind(exclude_status.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BookingError::database("find_overlapping", e))?
            .iter()
            .map(reservation_from_row)
            .collect()
    }

    async fn find_booked_vehicle_ids(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_status: ReservationStatus,
    ) -> Result<Vec<VehicleId>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT vehicle_id FROM reservations
            WHERE start_time <= $2 AND end_time >= $1 AND status <> $3
            ORDER BY vehicle_id
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(exclude_status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BookingError::database("find_booked_vehicle_ids", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("vehicle_id")
                    .map(VehicleId::from_uuid)
                    .map_err(decode)
            })
            .collect()
    }

    async fn update_if_status(
        &self,
        reservation: &Reservation,
        expected: ReservationStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $2, rating = $3, feedback = $4, payment_reference = $5, updated_at = $6
            WHERE reservation_id = $1 AND status = $7
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.status.to_string())
        .bind(reservation.rating.map(|r| i16::from(r.value())))
        .bind(&reservation.feedback)
        .bind(&reservation.payment_reference)
        .bind(reservation.updated_at)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| reservation_write_error("update_reservation_status", reservation, e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.get_reservation(&reservation.id).await?.is_none() {
            return Err(BookingError::ReservationNotFound {
                id: reservation.id.to_string(),
            });
        }
        Ok(false)
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.begin("begin_insert_reservation").await?;
        Self::lock_vehicle(&mut tx, &reservation.vehicle_id).await?;

        let clashes: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE vehicle_id = $1 AND start_time <= $3 AND end_time >= $2 AND status <> 'canceled'
            "#,
        )
        .bind(reservation.vehicle_id.as_uuid())
        .bind(reservation.window.start())
        .bind(reservation.window.end())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| BookingError::database("check_overlap", e))?;

        if clashes > 0 {
            return Err(conflict(reservation));
        }

        sqlx::query(
            r#"
            INSERT INTO reservations
                (reservation_id, vehicle_id, user_id, start_time, end_time, total_cost,
                 status, rating, feedback, payment_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.vehicle_id.as_uuid())
        .bind(reservation.user_id.as_str())
        .bind(reservation.window.start())
        .bind(reservation.window.end())
        .bind(reservation.total_cost.as_decimal())
        .bind(reservation.status.to_string())
        .bind(reservation.rating.map(|r| i16::from(r.value())))
        .bind(&reservation.feedback)
        .bind(&reservation.payment_reference)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_exclusion_violation(&e) {
                warn!(
                    "Exclusion constraint rejected reservation {} on vehicle {}",
                    reservation.id, reservation.vehicle_id
                );
            }
            reservation_write_error("insert_reservation", reservation, e)
        })?;

        tx.commit()
            .await
            .map_err(|e| BookingError::database("commit_insert_reservation", e))?;
        Ok(())
    }

    async fn record_rating(
        &self,
        reservation_id: &ReservationId,
        rating: Rating,
        feedback: Option<String>,
    ) -> Result<(Reservation, Vehicle)> {
        let vehicle_id = self
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound {
                id: reservation_id.to_string(),
            })?
            .vehicle_id;

        let mut tx = self.begin("begin_record_rating").await?;
        // Vehicle row first, matching the lock order of insert and delete
        let mut vehicle = Self::lock_vehicle(&mut tx, &vehicle_id).await?;

        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_id = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(reservation_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| BookingError::database("lock_reservation", e))?
            .ok_or_else(|| BookingError::ReservationNotFound {
                id: reservation_id.to_string(),
            })?;
        let mut reservation = reservation_from_row(&row)?;

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

        let now = Utc::now();
        reservation.rating = Some(rating);
        reservation.feedback = feedback;
        reservation.updated_at = now;
        vehicle.rating = RatingAggregator::apply(vehicle.rating, rating);
        vehicle.updated_at = now;

        sqlx::query(
            "UPDATE reservations SET rating = $2, feedback = $3, updated_at = $4 WHERE reservation_id = $1",
        )
        .bind(reservation.id.as_uuid())
        .bind(i16::from(rating.value()))
        .bind(&reservation.feedback)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| BookingError::database("rate_reservation", e))?;

        sqlx::query(
            "UPDATE vehicles SET rating_mean = $2, rating_count = $3, updated_at = $4 WHERE vehicle_id = $1",
        )
        .bind(vehicle.id.as_uuid())
        .bind(vehicle.rating.mean)
        .bind(vehicle.rating.count as i32)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| BookingError::database("update_vehicle_rating", e))?;

        tx.commit()
            .await
            .map_err(|e| BookingError::database("commit_record_rating", e))?;
        Ok((reservation, vehicle))
    }

    async fn delete_vehicle_cascade(&self, vehicle_id: &VehicleId) -> Result<u64> {
        let mut tx = self.begin("begin_delete_vehicle").await?;
        Self::lock_vehicle(&mut tx, vehicle_id).await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE vehicle_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(vehicle_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| BookingError::database("count_active_reservations", e))?;

        if active > 0 {
            return Err(BookingError::VehicleInUse {
                id: vehicle_id.to_string(),
                active: active as usize,
            });
        }

        let removed = sqlx::query("DELETE FROM reservations WHERE vehicle_id = $1")
            .bind(vehicle_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| BookingError::database("delete_vehicle_reservations", e))?
            .rows_affected();

        sqlx::query("DELETE FROM vehicles WHERE vehicle_id = $1")
            .bind(vehicle_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| BookingError::database("delete_vehicle", e))?;

        tx.commit()
            .await
            .map_err(|e| BookingError::database("commit_delete_vehicle", e))?;
        Ok(removed)
    }
}
