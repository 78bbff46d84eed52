//! In-process stores: the ephemeral point buffer and a trip store for
//! development and tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use fuelmeter_core::{
    GeoPoint, PointStore, StoreError, TraceId, Trip, TripId, TripRecord, TripStore,
};
use tokio::{sync::Mutex, time::Instant};

#[derive(Debug)]
struct BufferedTrace {
    points: Vec<GeoPoint>,
    touched: Instant,
}

/// Append-ordered point buffer keyed by trace id, with idle expiry.
#[derive(Clone, Debug, Default)]
pub struct MemoryPointStore {
    traces: Arc<Mutex<HashMap<String, BufferedTrace>>>,
}

impl MemoryPointStore {
    /// Drops every trace untouched for longer than `ttl`, returning how many.
    pub async fn expire(&self, ttl: Duration) -> usize {
        match Instant::now().checked_sub(ttl) {
            Some(cutoff) => self.expire_idle_since(cutoff).await,
            None => 0,
        }
    }

    async fn expire_idle_since(&self, cutoff: Instant) -> usize {
        let mut traces = self.traces.lock().await;
        let before = traces.len();
        traces.retain(|_, trace| trace.touched >= cutoff);
        before - traces.len()
    }

    pub async fn trace_count(&self) -> usize {
        self.traces.lock().await.len()
    }
}

impl PointStore for MemoryPointStore {
    async fn append(&self, trace_id: &TraceId, point: GeoPoint) -> Result<(), StoreError> {
        let mut traces = self.traces.lock().await;
        let trace = traces
            .entry(trace_id.store_key())
            .or_insert_with(|| BufferedTrace {
                points: Vec::new(),
                touched: Instant::now(),
            });
        trace.points.push(point);
        trace.touched = Instant::now();
        Ok(())
    }

    async fn read_all(&self, trace_id: &TraceId) -> Result<Vec<GeoPoint>, StoreError> {
        Ok(self
            .traces
            .lock()
            .await
            .get(&trace_id.store_key())
            .map(|trace| trace.points.clone())
            .unwrap_or_default())
    }

    async fn discard(&self, trace_id: &TraceId) -> Result<(), StoreError> {
        self.traces.lock().await.remove(&trace_id.store_key());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryTrips {
    last_id: i64,
    trips: BTreeMap<TripId, Trip>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryTripStore {
    inner: Arc<Mutex<MemoryTrips>>,
}

impl MemoryTripStore {
    pub async fn len(&self) -> usize {
        self.inner.lock().await.trips.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<TripRecord> {
        self.inner
            .lock()
            .await
            .trips
            .iter()
            .map(|(id, trip)| TripRecord {
                id: *id,
                trip: trip.clone(),
            })
            .collect()
    }
}

impl TripStore for MemoryTripStore {
    async fn create_trip(&self, trip: &Trip) -> Result<TripId, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.last_id += 1;
        let id = TripId(inner.last_id);
        inner.trips.insert(id, trip.clone());
        Ok(id)
    }

    async fn get_trip(&self, id: TripId) -> Result<TripRecord, StoreError> {
        self.inner
            .lock()
            .await
            .trips
            .get(&id)
            .map(|trip| TripRecord {
                id,
                trip: trip.clone(),
            })
            .ok_or(StoreError::TripNotFound(id))
    }

    async fn update_trip(&self, record: &TripRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let trip = inner
            .trips
            .get_mut(&record.id)
            .ok_or(StoreError::TripNotFound(record.id))?;
        *trip = record.trip.clone();
        Ok(())
    }

    async fn delete_trip(&self, id: TripId) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .trips
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::TripNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use fuelmeter_core::Coordinate;

    use super::*;

    fn point(latitude: f64) -> GeoPoint {
        GeoPoint::new(
            DateTime::parse_from_rfc3339("2023-10-10T10:00:00Z").unwrap(),
            latitude,
            0.0,
        )
    }

    #[tokio::test]
    async fn traces_keep_arrival_order_and_stay_apart() {
        let store = MemoryPointStore::default();
        let (a, b) = (TraceId::generate(), TraceId::generate());
        for lat in [3.0, 1.0, 2.0] {
            store.append(&a, point(lat)).await.unwrap();
        }
        store.append(&b, point(9.0)).await.unwrap();

        let lats: Vec<f64> = store
            .read_all(&a)
            .await
            .unwrap()
            .iter()
            .map(|p| p.latitude)
            .collect();
        assert_eq!(lats, [3.0, 1.0, 2.0]);
        assert_eq!(store.read_all(&b).await.unwrap().len(), 1);
        assert!(
            store
                .read_all(&TraceId::generate())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn discard_removes_only_that_trace() {
        let store = MemoryPointStore::default();
        let (a, b) = (TraceId::generate(), TraceId::generate());
        store.append(&a, point(1.0)).await.unwrap();
        store.append(&b, point(2.0)).await.unwrap();
        store.discard(&a).await.unwrap();
        assert!(store.read_all(&a).await.unwrap().is_empty());
        assert_eq!(store.trace_count().await, 1);
    }

    #[tokio::test]
    async fn idle_traces_expire() {
        let store = MemoryPointStore::default();
        store.append(&TraceId::generate(), point(1.0)).await.unwrap();

        assert_eq!(store.expire(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.trace_count().await, 1);

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(store.expire_idle_since(later).await, 1);
        assert_eq!(store.trace_count().await, 0);
    }

    fn trip(lat: f64) -> Trip {
        let c = Coordinate {
            latitude: lat,
            longitude: 0.0,
        };
        Trip {
            start: c,
            end: c,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn trip_crud() {
        let store = MemoryTripStore::default();
        let first = store.create_trip(&trip(1.0)).await.unwrap();
        let second = store.create_trip(&trip(2.0)).await.unwrap();
        assert_ne!(first, second);

        let mut record = store.get_trip(first).await.unwrap();
        record.trip.end.latitude = 5.0;
        store.update_trip(&record).await.unwrap();
        assert!((store.get_trip(first).await.unwrap().trip.end.latitude - 5.0).abs() < f64::EPSILON);

        store.delete_trip(first).await.unwrap();
        assert_eq!(
            store.get_trip(first).await,
            Err(StoreError::TripNotFound(first))
        );
        assert_eq!(
            store.delete_trip(first).await,
            Err(StoreError::TripNotFound(first))
        );
        assert_eq!(
            store
                .update_trip(&TripRecord {
                    id: TripId(99),
                    trip: trip(0.0)
                })
                .await,
            Err(StoreError::TripNotFound(TripId(99)))
        );
        assert_eq!(store.len().await, 1);
    }
}
