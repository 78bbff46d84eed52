use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use fuelmeter_core::{Coordinate, StoreError, Trip, TripId, TripRecord, TripStore};
use fuelmeter_tokio::{PointBackend, Server, Sessions, TripBackend};
use serde::Deserialize;

use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server<PointBackend, TripBackend>>,
    pub sessions: Sessions,
    pub trips: TripBackend,
}

impl AppState {
    pub fn new(server: Server<PointBackend, TripBackend>, trips: TripBackend) -> Self {
        Self {
            sessions: server.sessions(),
            server: Arc::new(server),
            trips,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/ws", get(ws::upgrade))
        .route(
            "/trips/{id}",
            get(get_trip).put(update_trip).delete(delete_trip),
        )
        .with_state(state)
}

/// New endpoints of an existing trip.
#[derive(Debug, Deserialize)]
pub struct TripUpdate {
    pub start: Coordinate,
    pub end: Coordinate,
}

type ApiError = (StatusCode, String);

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::TripNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::Unavailable(_) | StoreError::Rejected(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn list_sessions(State(state): State<AppState>) -> String {
    format!("{:#?}", *(state.sessions.lock().await))
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<String, StatusCode> {
    if let Some(session) = state.sessions.lock().await.get(&id) {
        Ok(format!("{session:#?}"))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_trip(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<TripRecord>, ApiError> {
    state
        .trips
        .get_trip(TripId(id))
        .await
        .map(Json)
        .map_err(store_error)
}

async fn update_trip(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(update): Json<TripUpdate>,
) -> Result<Json<TripRecord>, ApiError> {
    let existing = state
        .trips
        .get_trip(TripId(id))
        .await
        .map_err(store_error)?;
    let record = TripRecord {
        id: existing.id,
        trip: Trip {
            start: update.start,
            end: update.end,
            created_at: existing.trip.created_at,
        },
    };
    state
        .trips
        .update_trip(&record)
        .await
        .map_err(store_error)?;
    Ok(Json(record))
}

async fn delete_trip(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state
        .trips
        .delete_trip(TripId(id))
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fuelmeter_core::Config;
    use fuelmeter_tokio::{MemoryPointStore, MemoryTripStore};

    use super::*;

    fn coordinate(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    async fn state_with_trip() -> (AppState, TripId) {
        let trips = TripBackend::Memory(MemoryTripStore::default());
        let id = trips
            .create_trip(&Trip {
                start: coordinate(35.6895, 139.6917),
                end: coordinate(35.6762, 139.6503),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let server = Server::new(
            Config::default(),
            PointBackend::Memory(MemoryPointStore::default()),
            trips.clone(),
        );
        (AppState::new(server, trips), id)
    }

    #[tokio::test]
    async fn trip_can_be_read_updated_and_deleted() {
        let (state, id) = state_with_trip().await;

        let Json(record) = get_trip(Path(id.0), State(state.clone())).await.unwrap();
        assert_eq!(record.id, id);

        let Json(updated) = update_trip(
            Path(id.0),
            State(state.clone()),
            Json(TripUpdate {
                start: coordinate(1.0, 2.0),
                end: coordinate(3.0, 4.0),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.trip.created_at, record.trip.created_at);
        let Json(reread) = get_trip(Path(id.0), State(state.clone())).await.unwrap();
        assert_eq!(reread, updated);

        assert_eq!(
            delete_trip(Path(id.0), State(state.clone())).await.unwrap(),
            StatusCode::NO_CONTENT
        );
        let (status, _) = get_trip(Path(id.0), State(state)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found() {
        let (state, _) = state_with_trip().await;
        let update = TripUpdate {
            start: coordinate(0.0, 0.0),
            end: coordinate(0.0, 0.0),
        };
        let (status, _) = update_trip(Path(42), State(state.clone()), Json(update))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = delete_trip(Path(42), State(state)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_failures_are_server_errors() {
        let (status, _) = store_error(StoreError::Unavailable("down".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn session_listing_starts_empty() {
        let (state, _) = state_with_trip().await;
        assert_eq!(list_sessions(State(state.clone())).await, "{}");
        assert_eq!(
            get_session(Path("nope".to_string()), State(state))
                .await
                .unwrap_err(),
            StatusCode::NOT_FOUND
        );
    }
}
