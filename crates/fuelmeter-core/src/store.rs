//! Interfaces of the two storage backends a session talks to.
//!
//! Implementations are cheap handles (clone shares the backend) and are used
//! concurrently by many sessions; sessions never share a trace id, so no
//! locking across keys is expected from them.

use crate::{GeoPoint, StoreError, TraceId, Trip, TripId, TripRecord};

/// Short-lived, append-ordered buffer of points keyed by trace id.
pub trait PointStore: Clone + Send + Sync + 'static {
    /// Appends a point to the end of the trace.
    fn append(
        &self,
        trace_id: &TraceId,
        point: GeoPoint,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns every point of the trace in arrival order. An unknown trace
    /// yields an empty sequence.
    fn read_all(
        &self,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<Vec<GeoPoint>, StoreError>> + Send;

    /// Drops the trace once its trip has been finalized.
    fn discard(&self, trace_id: &TraceId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Persistent storage of finalized trips.
pub trait TripStore: Clone + Send + Sync + 'static {
    /// Creates one trip within a single unit of work.
    fn create_trip(&self, trip: &Trip) -> impl Future<Output = Result<TripId, StoreError>> + Send;

    fn get_trip(&self, id: TripId) -> impl Future<Output = Result<TripRecord, StoreError>> + Send;

    fn update_trip(
        &self,
        record: &TripRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_trip(&self, id: TripId) -> impl Future<Output = Result<(), StoreError>> + Send;
}
