//! Decoded Device Events
//!
//! Wire format consumed from the queue. Every event carries the data point that
//! triggered a rule, the device that produced it, and the rule itself.

use crate::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload published to warm up subscriptions; carries no event.
pub const PRIME_PAYLOAD: &[u8] = b"prime";

/// Typed value of a data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    #[serde(rename = "intVal")]
    Int(i64),
    #[serde(rename = "fl64Val")]
    Float(f64),
    #[serde(rename = "strVal")]
    Str(String),
    #[serde(rename = "boolVal")]
    Bool(bool),
    #[serde(rename = "bytesVal")]
    Bytes(Vec<u8>),
}

/// A single device data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub uniq_id: String,
    pub attr: String,
    #[serde(default)]
    pub value: Option<PointValue>,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub trace_id: String,
}

/// Device that produced the point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub org_id: String,
    pub uniq_id: String,
    #[serde(default)]
    pub name: String,
}

/// Rule that matched the point upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub attr: String,
    pub expr: String,
}

/// Event as it appears on the wire, sub-messages possibly absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub point: Option<Point>,
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub rule: Option<Rule>,
}

impl EventMessage {
    /// Serialize for publishing
    pub fn to_payload(&self) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec(self).map_err(|e| ModelError::Decode(e.to_string()))
    }

    fn validate(self) -> Result<Event, ModelError> {
        Ok(Event {
            point: self.point.ok_or(ModelError::MissingField("point"))?,
            device: self.device.ok_or(ModelError::MissingField("device"))?,
            rule: self.rule.ok_or(ModelError::MissingField("rule"))?,
        })
    }
}

/// A complete, validated event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub point: Point,
    pub device: Device,
    pub rule: Rule,
}

impl Event {
    pub fn to_payload(&self) -> Result<Vec<u8>, ModelError> {
        EventMessage::from(self.clone()).to_payload()
    }
}

impl From<Event> for EventMessage {
    fn from(event: Event) -> Self {
        Self {
            point: Some(event.point),
            device: Some(event.device),
            rule: Some(event.rule),
        }
    }
}

/// Outcome of decoding a queue payload
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Subscription warm-up sentinel
    Prime,
    Event(Event),
}

/// Decode a raw queue payload into an event.
///
/// Fails for malformed JSON and for events missing any of point, device or rule.
pub fn decode_event(payload: &[u8]) -> Result<Decoded, ModelError> {
    if payload == PRIME_PAYLOAD {
        return Ok(Decoded::Prime);
    }

    let message: EventMessage =
        serde_json::from_slice(payload).map_err(|e| ModelError::Decode(e.to_string()))?;
    message.validate().map(Decoded::Event)
}
