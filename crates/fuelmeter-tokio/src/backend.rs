use std::time::Duration;

use fuelmeter_core::{
    GeoPoint, PointStore, StoreError, TraceId, Trip, TripId, TripRecord, TripStore,
};
use tokio::{spawn, task::JoinHandle, time::interval};
use tracing::{debug, error};

use crate::{MemoryPointStore, MemoryTripStore, PostgresPointStore, PostgresTripStore};

/// Point buffer chosen at startup: in PostgreSQL when a database is
/// configured, in process memory otherwise.
#[derive(Clone)]
pub enum PointBackend {
    Memory(MemoryPointStore),
    Postgres(PostgresPointStore),
}

impl PointBackend {
    /// Drops traces with no append for longer than `ttl`, returning how many
    /// traces (memory) or points (PostgreSQL) were removed.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the PostgreSQL store.
    pub async fn expire(&self, ttl: Duration) -> Result<u64, StoreError> {
        match self {
            Self::Memory(store) => Ok(u64::try_from(store.expire(ttl).await).unwrap_or(u64::MAX)),
            Self::Postgres(store) => store.expire(ttl).await,
        }
    }
}

impl PointStore for PointBackend {
    async fn append(&self, trace_id: &TraceId, point: GeoPoint) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.append(trace_id, point).await,
            Self::Postgres(store) => store.append(trace_id, point).await,
        }
    }

    async fn read_all(&self, trace_id: &TraceId) -> Result<Vec<GeoPoint>, StoreError> {
        match self {
            Self::Memory(store) => store.read_all(trace_id).await,
            Self::Postgres(store) => store.read_all(trace_id).await,
        }
    }

    async fn discard(&self, trace_id: &TraceId) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.discard(trace_id).await,
            Self::Postgres(store) => store.discard(trace_id).await,
        }
    }
}

/// Periodically expires traces that were abandoned before their trip finished.
pub fn spawn_trace_expiry(store: PointBackend, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            match store.expire(ttl).await {
                Ok(0) => {}
                Ok(expired) => debug!("expired {expired} idle trace entries"),
                Err(e) => error!("trace expiry failed: {e}"),
            }
        }
    })
}

/// Trip store chosen at startup from the configuration.
#[derive(Clone)]
pub enum TripBackend {
    Memory(MemoryTripStore),
    Postgres(PostgresTripStore),
}

impl TripStore for TripBackend {
    async fn create_trip(&self, trip: &Trip) -> Result<TripId, StoreError> {
        match self {
            Self::Memory(store) => store.create_trip(trip).await,
            Self::Postgres(store) => store.create_trip(trip).await,
        }
    }

    async fn get_trip(&self, id: TripId) -> Result<TripRecord, StoreError> {
        match self {
            Self::Memory(store) => store.get_trip(id).await,
            Self::Postgres(store) => store.get_trip(id).await,
        }
    }

    async fn update_trip(&self, record: &TripRecord) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.update_trip(record).await,
            Self::Postgres(store) => store.update_trip(record).await,
        }
    }

    async fn delete_trip(&self, id: TripId) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.delete_trip(id).await,
            Self::Postgres(store) => store.delete_trip(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    #[tokio::test]
    async fn memory_backend_delegates() {
        let memory = MemoryPointStore::default();
        let backend = PointBackend::Memory(memory.clone());
        let trace_id = TraceId::generate();
        let point = GeoPoint::new(
            DateTime::parse_from_rfc3339("2023-10-10T10:00:00Z").unwrap(),
            1.0,
            2.0,
        );

        backend.append(&trace_id, point.clone()).await.unwrap();
        assert_eq!(memory.read_all(&trace_id).await.unwrap(), [point]);
        assert_eq!(backend.expire(Duration::from_secs(3600)).await, Ok(0));

        backend.discard(&trace_id).await.unwrap();
        assert_eq!(memory.trace_count().await, 0);
    }
}
