use chrono::Utc;
use fuelmeter_core::{GeoPoint, StoreError, TraceId, Trip, TripId, TripStore};
use tracing::{error, info};

/// Persists completed trips. Failures are logged and returned, never retried.
#[derive(Clone, Debug)]
pub struct TripFinalizer<S> {
    store: S,
}

impl<S: TripStore> TripFinalizer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates the trip from `start` to `end`.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] reported by the trip store.
    pub async fn finalize(
        &self,
        trace_id: &TraceId,
        start: &GeoPoint,
        end: &GeoPoint,
    ) -> Result<TripId, StoreError> {
        let trip = Trip::between(start, end, Utc::now());
        match self.store.create_trip(&trip).await {
            Ok(id) => {
                info!("{trace_id}: trip {id} saved to database");
                Ok(id)
            }
            Err(e) => {
                error!("{trace_id}: error saving trip to database: {e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::MemoryTripStore;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint::new(
            DateTime::parse_from_rfc3339("2023-10-10T10:00:00Z").unwrap(),
            latitude,
            longitude,
        )
    }

    #[tokio::test]
    async fn stores_start_and_end_coordinates() {
        let store = MemoryTripStore::default();
        let finalizer = TripFinalizer::new(store.clone());

        let id = finalizer
            .finalize(&TraceId::generate(), &point(1.0, 2.0), &point(3.0, 4.0))
            .await
            .unwrap();

        let record = store.get_trip(id).await.unwrap();
        assert!((record.trip.start.latitude - 1.0).abs() < f64::EPSILON);
        assert!((record.trip.start.longitude - 2.0).abs() < f64::EPSILON);
        assert!((record.trip.end.latitude - 3.0).abs() < f64::EPSILON);
        assert!((record.trip.end.longitude - 4.0).abs() < f64::EPSILON);
    }
}
