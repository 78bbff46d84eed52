use chrono::{DateTime, Utc};

use crate::{
    GeoPoint, InboundMessage, Outbound, StoreError, TraceId, TransportError, ValidationError,
};

/// Events that drive the session state machine.
///
/// Besides frames and transport failures coming from the client, the driver
/// reports back the outcome of every store [`Action`] it executed.
#[derive(Debug)]
pub enum Event {
    /// A frame passed validation.
    Received { now: DateTime<Utc>, msg: InboundMessage },
    /// A frame failed validation.
    Invalid(ValidationError),
    /// Reading from the connection failed or the connection was closed.
    Transport(TransportError),
    /// The last [`Action::Append`] succeeded.
    Appended,
    /// The last [`Action::Append`] failed, the point is lost.
    AppendFailed(StoreError),
    /// Result of an [`Action::ReadTrace`].
    TraceLoaded(Vec<GeoPoint>),
    /// An [`Action::ReadTrace`] failed.
    TraceLoadFailed(StoreError),
}

/// Work queued by the state machine for the driver to carry out, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Write a frame to the client.
    Send(Outbound),
    /// Buffer a point; answer with [`Event::Appended`] or [`Event::AppendFailed`].
    Append { trace_id: TraceId, point: GeoPoint },
    /// Read the whole trace back; answer with [`Event::TraceLoaded`] or
    /// [`Event::TraceLoadFailed`].
    ReadTrace { trace_id: TraceId },
    /// Persist the trip and drop the buffered trace. Queued at most once per session.
    FinalizeTrip {
        trace_id: TraceId,
        start: GeoPoint,
        end: GeoPoint,
    },
}
