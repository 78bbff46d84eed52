//! Sans-IO core of the fuel meter tracking service.
//!
//! A client streams geolocation samples over a persistent connection. Each
//! connection runs one [`Session`]: a state machine that consumes [`Event`]s
//! and queues [`Action`]s (frames to send, store operations) in a
//! [`SessionContext`] for an I/O driver to execute. When the trip completes
//! the buffered trace is read back, its length and fuel cost are computed and
//! the trip is handed over for persistence.

mod config;
mod error;
mod event;
mod fuel;
pub mod geo;
mod identifier;
mod message;
mod session;
pub mod store;
mod trip;

pub use config::{
    Config, DEFAULT_ERROR_THRESHOLD, DEFAULT_PORT, DEFAULT_TRACE_TTL, PostgresConfig,
};
pub use error::{ComputationError, StoreError, TransportError, ValidationError};
pub use event::{Action, Event};
pub use fuel::{DEFAULT_FUEL_EFFICIENCY_KM_PER_LITER, DEFAULT_FUEL_PRICE_PER_LITER, FuelRates};
pub use geo::GeoPoint;
pub use identifier::TraceId;
pub use message::{
    AckResponse, AckStatus, ControlSignal, FinishResponse, InboundMessage, Outbound,
};
pub use session::{Session, SessionContext, SessionState, State};
pub use store::{PointStore, TripStore};
pub use trip::{Coordinate, Trip, TripId, TripRecord};
