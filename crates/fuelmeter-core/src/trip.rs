use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::GeoPoint;

/// Row identifier of a persisted trip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(pub i64);

impl Display for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&GeoPoint> for Coordinate {
    fn from(point: &GeoPoint) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
        }
    }
}

/// Summary of a completed trip: where it began and where it ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub start: Coordinate,
    pub end: Coordinate,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Trip {
    #[must_use]
    pub fn between(start: &GeoPoint, end: &GeoPoint, created_at: DateTime<Utc>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            created_at,
        }
    }
}

/// A trip as held by the durable store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: TripId,
    #[serde(flatten)]
    pub trip: Trip,
}
