//! Text encodings for control-pad events.
//!
//! Two layouts are supported, selectable per play session:
//!
//! ```text
//! JSON: {"id":"stick","type":"joystick","x":0.5,"y":-1.0}
//! CSV:  stick,0.5,-1
//! ```
//!
//! The encoders never append a line terminator.  Line-oriented transports
//! (TCP, Bluetooth classic) add `\n` themselves; message-oriented transports
//! (WebSocket, BLE, MQTT) send the string as one message.
//!
//! Floats are written with Rust's shortest round-trip formatting, so decoding
//! an encoded event yields exactly the original values.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::event::{ButtonState, DPadButton, Event, EventKind, EventType};

/// CSV field separator.
const CSV_SEPARATOR: char = ',';

/// Wire layout of an encoded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Compact tagged JSON object.
    #[default]
    Json,
    /// Positional comma-separated values, id first.
    Csv,
}

impl FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown data format '{other}' (expected json or csv)")),
        }
    }
}

/// Errors that can occur while encoding an event.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Events must carry the id the receiver is bound to.
    #[error("event id must not be empty")]
    EmptyId,

    /// The id contains a separator or line break and would corrupt a CSV line.
    #[error("event id '{0}' contains a comma or line break and cannot be sent as CSV")]
    InvalidCsvId(String),

    /// NaN and infinity have no JSON representation and are never sent.
    #[error("field '{field}' is {value}; only finite values can be encoded")]
    NonFinite { field: &'static str, value: f32 },

    /// serde_json failed to serialize the event.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while decoding an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The JSON text is not a valid event object.
    #[error("invalid JSON event: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded id is empty.
    #[error("event id must not be empty")]
    EmptyId,

    /// The CSV line has the wrong number of fields for the expected type.
    #[error("expected {expected} field(s) after the id for {event_type}, found {found}")]
    FieldCount {
        event_type: EventType,
        expected: usize,
        found: usize,
    },

    /// A CSV field could not be parsed.
    #[error("field {index} ('{value}') is invalid: {reason}")]
    InvalidField {
        index: usize,
        value: String,
        reason: String,
    },

    /// A CSV field parsed as NaN or infinity.
    #[error("field '{field}' is {value}; only finite values are valid")]
    NonFinite { field: &'static str, value: f32 },

    /// A JSON event decoded as a different type than the caller expected.
    #[error("expected a {expected} event, found {found}")]
    TypeMismatch {
        expected: EventType,
        found: EventType,
    },
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// Renders events in the session's chosen [`DataFormat`].
///
/// Cheap to copy; a play session keeps one for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventEncoder {
    format: DataFormat,
}

impl EventEncoder {
    pub fn new(format: DataFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    /// Encodes `event` without a trailing line terminator.
    ///
    /// # Errors
    ///
    /// [`EncodeError::EmptyId`] for an empty id,
    /// [`EncodeError::NonFinite`] for a NaN or infinite axis value, and
    /// [`EncodeError::InvalidCsvId`] when a CSV id contains `,`, `\r` or `\n`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use padlink_core::{DataFormat, Event, EventEncoder, EventKind};
    ///
    /// let event = Event::new("throttle", EventKind::Slider { value: 0.25 });
    /// let csv = EventEncoder::new(DataFormat::Csv).encode(&event).unwrap();
    /// assert_eq!(csv, "throttle,0.25");
    /// ```
    pub fn encode(&self, event: &Event) -> Result<String, EncodeError> {
        if event.id.is_empty() {
            return Err(EncodeError::EmptyId);
        }
        if let Some((field, value)) = non_finite_field(&event.kind) {
            return Err(EncodeError::NonFinite { field, value });
        }
        match self.format {
            DataFormat::Json => Ok(serde_json::to_string(event)?),
            DataFormat::Csv => encode_csv(event),
        }
    }
}

/// Returns the first float field holding NaN or infinity.
fn non_finite_field(kind: &EventKind) -> Option<(&'static str, f32)> {
    let fields: Vec<(&'static str, f32)> = match *kind {
        EventKind::Slider { value } => vec![("value", value)],
        EventKind::SteeringWheel { angle } => vec![("angle", angle)],
        EventKind::JoyStick { x, y } => vec![("x", x), ("y", y)],
        EventKind::Accelerometer { x, y, z } | EventKind::Gyroscope { x, y, z } => {
            vec![("x", x), ("y", y), ("z", z)]
        }
        EventKind::Switch { .. } | EventKind::Button { .. } | EventKind::DPad { .. } => Vec::new(),
    };
    fields.into_iter().find(|(_, value)| !value.is_finite())
}

fn encode_csv(event: &Event) -> Result<String, EncodeError> {
    if event.id.contains([CSV_SEPARATOR, '\r', '\n']) {
        return Err(EncodeError::InvalidCsvId(event.id.clone()));
    }

    let fields: Vec<String> = match &event.kind {
        EventKind::Slider { value } => vec![value.to_string()],
        EventKind::Switch { state } => vec![state.to_string()],
        EventKind::Button { state } => vec![state.as_str().to_string()],
        EventKind::DPad { button, state } => {
            vec![button.as_str().to_string(), state.as_str().to_string()]
        }
        EventKind::JoyStick { x, y } => vec![x.to_string(), y.to_string()],
        EventKind::SteeringWheel { angle } => vec![angle.to_string()],
        EventKind::Accelerometer { x, y, z } | EventKind::Gyroscope { x, y, z } => {
            vec![x.to_string(), y.to_string(), z.to_string()]
        }
    };

    let mut line = event.id.clone();
    for field in fields {
        line.push(CSV_SEPARATOR);
        line.push_str(&field);
    }
    Ok(line)
}

// ── Decoders ──────────────────────────────────────────────────────────────────

fn strip_line_end(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n'])
}

/// Decodes one JSON event.  A trailing line terminator is ignored.
pub fn decode_json(s: &str) -> Result<Event, DecodeError> {
    let event: Event = serde_json::from_str(strip_line_end(s))?;
    if event.id.is_empty() {
        return Err(DecodeError::EmptyId);
    }
    Ok(event)
}

/// Decodes one CSV line produced by a control of type `event_type`.
///
/// CSV carries no type tag, so the caller must know which control the line
/// belongs to.  A trailing line terminator is ignored.
pub fn decode_csv(s: &str, event_type: EventType) -> Result<Event, DecodeError> {
    let mut parts = strip_line_end(s).split(CSV_SEPARATOR);
    let id = parts.next().unwrap_or_default();
    if id.is_empty() {
        return Err(DecodeError::EmptyId);
    }

    let fields: Vec<&str> = parts.collect();
    let expected = event_type.field_count();
    if fields.len() != expected {
        return Err(DecodeError::FieldCount {
            event_type,
            expected,
            found: fields.len(),
        });
    }

    let kind = match event_type {
        EventType::Slider => EventKind::Slider {
            value: parse_field(&fields, 0)?,
        },
        EventType::Switch => EventKind::Switch {
            state: parse_field(&fields, 0)?,
        },
        EventType::Button => EventKind::Button {
            state: parse_field(&fields, 0)?,
        },
        EventType::DPad => EventKind::DPad {
            button: parse_field::<DPadButton>(&fields, 0)?,
            state: parse_field::<ButtonState>(&fields, 1)?,
        },
        EventType::JoyStick => EventKind::JoyStick {
            x: parse_field(&fields, 0)?,
            y: parse_field(&fields, 1)?,
        },
        EventType::SteeringWheel => EventKind::SteeringWheel {
            angle: parse_field(&fields, 0)?,
        },
        EventType::Accelerometer => EventKind::Accelerometer {
            x: parse_field(&fields, 0)?,
            y: parse_field(&fields, 1)?,
            z: parse_field(&fields, 2)?,
        },
        EventType::Gyroscope => EventKind::Gyroscope {
            x: parse_field(&fields, 0)?,
            y: parse_field(&fields, 1)?,
            z: parse_field(&fields, 2)?,
        },
    };
    if let Some((field, value)) = non_finite_field(&kind) {
        return Err(DecodeError::NonFinite { field, value });
    }

    Ok(Event::new(id, kind))
}

/// Decodes `s` in `format`, checking that it is an `event_type` event.
pub fn decode(s: &str, format: DataFormat, event_type: EventType) -> Result<Event, DecodeError> {
    match format {
        DataFormat::Csv => decode_csv(s, event_type),
        DataFormat::Json => {
            let event = decode_json(s)?;
            if event.event_type() != event_type {
                return Err(DecodeError::TypeMismatch {
                    expected: event_type,
                    found: event.event_type(),
                });
            }
            Ok(event)
        }
    }
}

fn parse_field<T>(fields: &[&str], index: usize) -> Result<T, DecodeError>
where
    T: FromStr,
    T::Err: ToString,
{
    let value = fields[index];
    value.parse().map_err(|e: T::Err| DecodeError::InvalidField {
        // Field numbering is 1-based after the id, matching how receivers
        // document their CSV columns.
        index: index + 1,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
