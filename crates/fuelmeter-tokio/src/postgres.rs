use std::{fmt::Display, time::Duration};

use anyhow::Context as _;
use chrono::{DateTime, FixedOffset, Utc};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use fuelmeter_core::{
    Coordinate, GeoPoint, PointStore, PostgresConfig, StoreError, TraceId, Trip, TripId,
    TripRecord, TripStore,
};
use tokio_postgres::{NoTls, Row};
use tracing::{info, warn};

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS trips (
        id BIGSERIAL PRIMARY KEY,
        start_latitude DOUBLE PRECISION NOT NULL,
        start_longitude DOUBLE PRECISION NOT NULL,
        end_latitude DOUBLE PRECISION NOT NULL,
        end_longitude DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE TABLE IF NOT EXISTS trace_points (
        seq BIGSERIAL PRIMARY KEY,
        trace_key TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        utc_offset_secs INTEGER NOT NULL,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        appended_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE INDEX IF NOT EXISTS trace_points_by_key ON trace_points (trace_key, seq)";

const INSERT_TRIP: &str = "INSERT INTO trips
    (start_latitude, start_longitude, end_latitude, end_longitude, created_at)
    VALUES ($1, $2, $3, $4, $5) RETURNING id";

const SELECT_TRIP: &str = "SELECT id, start_latitude, start_longitude, end_latitude,
    end_longitude, created_at FROM trips WHERE id = $1";

const UPDATE_TRIP: &str = "UPDATE trips SET start_latitude = $2, start_longitude = $3,
    end_latitude = $4, end_longitude = $5, created_at = $6 WHERE id = $1";

const DELETE_TRIP: &str = "DELETE FROM trips WHERE id = $1";

const INSERT_POINT: &str = "INSERT INTO trace_points
    (trace_key, recorded_at, utc_offset_secs, latitude, longitude)
    VALUES ($1, $2, $3, $4, $5)";

const SELECT_POINTS: &str = "SELECT recorded_at, utc_offset_secs, latitude, longitude
    FROM trace_points WHERE trace_key = $1 ORDER BY seq";

const DELETE_POINTS: &str = "DELETE FROM trace_points WHERE trace_key = $1";

const EXPIRE_POINTS: &str = "DELETE FROM trace_points WHERE trace_key IN (
    SELECT trace_key FROM trace_points GROUP BY trace_key HAVING MAX(appended_at) < $1)";

/// Trip store backed by a pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PostgresTripStore {
    pool: Pool,
}

impl PostgresTripStore {
    /// Creates the connection pool. Connections are opened lazily.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be built from `config`.
    pub fn connect(config: &PostgresConfig) -> anyhow::Result<Self> {
        let mut pg_config = PoolConfig::new();
        pg_config.host = Some(config.host.clone());
        pg_config.port = Some(config.port);
        pg_config.dbname = Some(config.database.clone());
        pg_config.user = Some(config.user.clone());
        pg_config.password.clone_from(&config.password);
        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("failed to create PostgreSQL pool")?;
        Ok(Self { pool })
    }

    /// Point store sharing this store's connection pool.
    #[must_use]
    pub fn points(&self) -> PostgresPointStore {
        PostgresPointStore {
            pool: self.pool.clone(),
        }
    }

    /// Verifies connectivity and creates the `trips` and `trace_points`
    /// tables if they are missing.
    ///
    /// # Errors
    ///
    /// Fails if no connection can be obtained or the DDL is rejected.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("failed to connect to PostgreSQL")?;
        client
            .batch_execute(CREATE_TABLE)
            .await
            .context("failed to create tables")?;
        info!("trips and trace_points tables ready");
        Ok(())
    }

    /// Closes the pool; pending and future operations fail.
    pub fn close(&self) {
        self.pool.close();
    }
}

fn unavailable(e: impl Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn rejected(e: impl Display) -> StoreError {
    StoreError::Rejected(e.to_string())
}

fn record_from_row(row: &Row) -> Result<TripRecord, tokio_postgres::Error> {
    Ok(TripRecord {
        id: TripId(row.try_get("id")?),
        trip: Trip {
            start: Coordinate {
                latitude: row.try_get("start_latitude")?,
                longitude: row.try_get("start_longitude")?,
            },
            end: Coordinate {
                latitude: row.try_get("end_latitude")?,
                longitude: row.try_get("end_longitude")?,
            },
            created_at: row.try_get("created_at")?,
        },
    })
}

impl TripStore for PostgresTripStore {
    async fn create_trip(&self, trip: &Trip) -> Result<TripId, StoreError> {
        let mut client = self.pool.get().await.map_err(unavailable)?;
        let tx = client.transaction().await.map_err(unavailable)?;

        let inserted = tx
            .query_one(
                INSERT_TRIP,
                &[
                    &trip.start.latitude,
                    &trip.start.longitude,
                    &trip.end.latitude,
                    &trip.end.longitude,
                    &trip.created_at,
                ],
            )
            .await
            .and_then(|row| row.try_get::<_, i64>("id"));
        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("rollback of trip insert failed: {rollback}");
                }
                return Err(rejected(e));
            }
        };

        tx.commit().await.map_err(rejected)?;
        Ok(TripId(id))
    }

    async fn get_trip(&self, id: TripId) -> Result<TripRecord, StoreError> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let row = client
            .query_opt(SELECT_TRIP, &[&id.0])
            .await
            .map_err(rejected)?
            .ok_or(StoreError::TripNotFound(id))?;
        record_from_row(&row).map_err(rejected)
    }

    async fn update_trip(&self, record: &TripRecord) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let trip = &record.trip;
        let updated = client
            .execute(
                UPDATE_TRIP,
                &[
                    &record.id.0,
                    &trip.start.latitude,
                    &trip.start.longitude,
                    &trip.end.latitude,
                    &trip.end.longitude,
                    &trip.created_at,
                ],
            )
            .await
            .map_err(rejected)?;
        if updated == 0 {
            return Err(StoreError::TripNotFound(record.id));
        }
        Ok(())
    }

    async fn delete_trip(&self, id: TripId) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let deleted = client
            .execute(DELETE_TRIP, &[&id.0])
            .await
            .map_err(rejected)?;
        if deleted == 0 {
            return Err(StoreError::TripNotFound(id));
        }
        Ok(())
    }
}

/// Point buffer kept in PostgreSQL, so traces outlive a restart of the
/// server. Rows are keyed like the in-memory store, `TRACE_ID:<id>`.
#[derive(Clone)]
pub struct PostgresPointStore {
    pool: Pool,
}

impl PostgresPointStore {
    /// Drops every trace with no append for longer than `ttl`, returning the
    /// number of points removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the database is unreachable or rejects the
    /// statement.
    pub async fn expire(&self, ttl: Duration) -> Result<u64, StoreError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(rejected)?;
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return Ok(0);
        };
        let client = self.pool.get().await.map_err(unavailable)?;
        client
            .execute(EXPIRE_POINTS, &[&cutoff])
            .await
            .map_err(rejected)
    }
}

fn point_from_row(row: &Row) -> Result<GeoPoint, StoreError> {
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(rejected)?;
    let offset_secs: i32 = row.try_get("utc_offset_secs").map_err(rejected)?;
    let offset = FixedOffset::east_opt(offset_secs)
        .ok_or_else(|| StoreError::Rejected(format!("invalid utc offset {offset_secs}")))?;
    Ok(GeoPoint::new(
        recorded_at.with_timezone(&offset),
        row.try_get("latitude").map_err(rejected)?,
        row.try_get("longitude").map_err(rejected)?,
    ))
}

impl PointStore for PostgresPointStore {
    async fn append(&self, trace_id: &TraceId, point: GeoPoint) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(unavailable)?;
        client
            .execute(
                INSERT_POINT,
                &[
                    &trace_id.store_key(),
                    &point.timestamp.with_timezone(&Utc),
                    &point.timestamp.offset().local_minus_utc(),
                    &point.latitude,
                    &point.longitude,
                ],
            )
            .await
            .map_err(rejected)?;
        Ok(())
    }

    async fn read_all(&self, trace_id: &TraceId) -> Result<Vec<GeoPoint>, StoreError> {
        let client = self.pool.get().await.map_err(unavailable)?;
        client
            .query(SELECT_POINTS, &[&trace_id.store_key()])
            .await
            .map_err(rejected)?
            .iter()
            .map(point_from_row)
            .collect()
    }

    async fn discard(&self, trace_id: &TraceId) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(unavailable)?;
        client
            .execute(DELETE_POINTS, &[&trace_id.store_key()])
            .await
            .map_err(rejected)?;
        Ok(())
    }
}
