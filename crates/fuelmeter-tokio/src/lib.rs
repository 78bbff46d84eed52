//! Tokio driver for the fuel meter tracking service.
//!
//! A [`Connection`] runs one client's session over any [`Transport`],
//! executing the store operations the session asks for. The [`Server`] spawns
//! connections against shared stores and keeps a registry of live sessions.
//!
//! With a database configured, buffered points and trips both live in
//! PostgreSQL ([`PostgresPointStore`], [`PostgresTripStore`]); without one
//! they are kept in memory ([`MemoryPointStore`], [`MemoryTripStore`]).
//! Abandoned traces expire in either case.
//!
//! The `fuelmeter-http` crate serves this over WebSocket.

mod backend;
mod connection;
mod finalizer;
mod memory;
mod postgres;
mod server;
#[cfg(test)]
mod testing;
mod transport;

pub use backend::{PointBackend, TripBackend, spawn_trace_expiry};
pub use connection::{Connection, ConnectionEvent};
pub use finalizer::TripFinalizer;
pub use memory::{MemoryPointStore, MemoryTripStore};
pub use postgres::{PostgresPointStore, PostgresTripStore};
pub use server::{Server, SessionStatus, Sessions};
pub use transport::Transport;
