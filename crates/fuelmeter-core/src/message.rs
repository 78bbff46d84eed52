use std::fmt::Display;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{GeoPoint, TraceId, ValidationError};

/// Control value carried by every inbound point message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    StartTracking,
    FinishTracking,
    /// Any other value, treated as a plain position update.
    Update(String),
}
impl ControlSignal {
    const START_TRACKING: &str = "START_TRACKING";
    const FINISH_TRACKING: &str = "FINISH_TRACKING";

    fn parse(value: &str) -> Self {
        match value {
            Self::START_TRACKING => Self::StartTracking,
            Self::FINISH_TRACKING => Self::FinishTracking,
            other => Self::Update(other.to_owned()),
        }
    }

    /// Whether the client signals that the trip is over.
    #[must_use]
    pub fn is_completion(&self) -> bool {
        *self == Self::FinishTracking
    }
}

impl Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartTracking => f.write_str(Self::START_TRACKING),
            Self::FinishTracking => f.write_str(Self::FINISH_TRACKING),
            Self::Update(value) => f.write_str(value),
        }
    }
}

/// Wire shape of an inbound frame. Every field is optional here so that
/// presence and type checks produce typed errors instead of serde errors.
#[derive(Deserialize)]
struct RawInbound {
    message: Option<Value>,
    timestamp: Option<Value>,
    latitude: Option<Value>,
    longitude: Option<Value>,
    #[serde(rename = "traceId", alias = "traceID")]
    trace_id: Option<String>,
    #[serde(rename = "processingStartTime", alias = "processingStarttime")]
    processing_start_time: Option<String>,
}

/// A validated point message from the client.
///
/// `trace_id` and `processing_start_time` are whatever the client echoed back;
/// the session never trusts them.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub signal: ControlSignal,
    pub point: GeoPoint,
    pub trace_id: Option<String>,
    pub processing_start_time: Option<String>,
}
impl InboundMessage {
    /// Decodes and validates a raw frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the payload is not a JSON object, or a
    /// required field is missing, has the wrong type or is out of range.
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let raw: RawInbound = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let signal = required_str(raw.message, "message")?;
        let timestamp = required_str(raw.timestamp, "timestamp")?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|_| ValidationError::BadTimestamp(timestamp))?;
        let latitude = required_number(raw.latitude, "latitude", 90.0)?;
        let longitude = required_number(raw.longitude, "longitude", 180.0)?;

        Ok(Self {
            signal: ControlSignal::parse(&signal),
            point: GeoPoint::new(timestamp, latitude, longitude),
            trace_id: raw.trace_id,
            processing_start_time: raw.processing_start_time,
        })
    }
}

fn required_str(value: Option<Value>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        None => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if s.is_empty() => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ValidationError::Malformed(format!(
            "field `{field}` must be a string, got {other}"
        ))),
    }
}

fn required_number(
    value: Option<Value>,
    field: &'static str,
    bound: f64,
) -> Result<f64, ValidationError> {
    let number = match value {
        None => return Err(ValidationError::MissingField(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or(ValidationError::NotNumeric(field))?,
        Some(_) => return Err(ValidationError::NotNumeric(field)),
    };
    if !(-bound..=bound).contains(&number) {
        return Err(ValidationError::OutOfRange(field));
    }
    Ok(number)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    Success,
    ValidateError,
}

/// Acknowledgement sent for every point message that does not finish the trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub status: AckStatus,
    pub processing_start_time: String,
    pub trace_id: String,
}
impl AckResponse {
    #[must_use]
    pub fn success(processing_start_time: &str, trace_id: &TraceId) -> Self {
        Self {
            status: AckStatus::Success,
            processing_start_time: processing_start_time.to_owned(),
            trace_id: trace_id.to_string(),
        }
    }

    #[must_use]
    pub fn validate_error() -> Self {
        Self {
            status: AckStatus::ValidateError,
            processing_start_time: String::new(),
            trace_id: String::new(),
        }
    }
}

/// Trip totals sent once when the client finishes tracking.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishResponse {
    /// Kilometres travelled.
    pub distance: f64,
    pub fuel_cost: f64,
    /// `yyyyMMddHHmmss`
    pub start_time: String,
    /// `yyyyMMddHHmmss`
    pub end_time: String,
}

/// Any frame the server sends to the client.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Ack(AckResponse),
    Finish(FinishResponse),
}
impl Outbound {
    /// Serializes the frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> serde_json::Result<String> {
        match self {
            Outbound::Ack(ack) => serde_json::to_string(ack),
            Outbound::Finish(finish) => serde_json::to_string(finish),
        }
    }
}
