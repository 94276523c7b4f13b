//! Typed control-pad events.
//!
//! Every interaction with a control on the pad, and every sensor sample,
//! becomes one [`Event`]: a user-chosen string id (the binding the receiver
//! listens for) plus an [`EventKind`] carrying the control-specific values.
//!
//! # JSON representation
//!
//! Events serialize to a flat JSON object.  The `"type"` field selects the
//! variant and the variant's fields sit next to the id:
//!
//! ```json
//! {"id":"throttle","type":"slider","value":0.75}
//! {"id":"stick","type":"joystick","x":-0.5,"y":1.0}
//! {"id":"fire","type":"button","state":"pressed"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` plus `#[serde(flatten)]` produce this
//! layout without any hand-written serialization code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Control value enums ───────────────────────────────────────────────────────

/// What happened to a push-style control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    /// The control went down and is being held.
    Pressed,
    /// The control was let go.
    Released,
    /// A complete press-and-release, reported as a single event.
    Clicked,
}

impl ButtonState {
    /// Returns the lowercase wire name used by both JSON and CSV encodings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pressed => "pressed",
            Self::Released => "released",
            Self::Clicked => "clicked",
        }
    }
}

impl FromStr for ButtonState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pressed" => Ok(Self::Pressed),
            "released" => Ok(Self::Released),
            "clicked" => Ok(Self::Clicked),
            other => Err(format!("unknown button state '{other}'")),
        }
    }
}

/// One arm of a directional pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DPadButton {
    Up,
    Down,
    Left,
    Right,
    Center,
}

impl DPadButton {
    /// Returns the lowercase wire name used by both JSON and CSV encodings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Center => "center",
        }
    }
}

impl FromStr for DPadButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "center" => Ok(Self::Center),
            other => Err(format!("unknown d-pad button '{other}'")),
        }
    }
}

// ── Event kinds ───────────────────────────────────────────────────────────────

/// The control-specific payload of an [`Event`].
///
/// Field order inside each variant is significant: the CSV encoding writes
/// the fields positionally in exactly this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A slider moved.  `value` is the slider position in its configured range.
    #[serde(rename = "slider")]
    Slider { value: f32 },

    /// A toggle switch changed position.
    #[serde(rename = "switch")]
    Switch { state: bool },

    /// A push button changed state.
    #[serde(rename = "button")]
    Button { state: ButtonState },

    /// One arm of a directional pad changed state.
    #[serde(rename = "dpad")]
    DPad { button: DPadButton, state: ButtonState },

    /// A joystick moved.  Both axes are normalised to `-1.0..=1.0`.
    #[serde(rename = "joystick")]
    JoyStick { x: f32, y: f32 },

    /// The steering wheel rotated.  `angle` is in degrees, positive clockwise.
    #[serde(rename = "steering_wheel")]
    SteeringWheel { angle: f32 },

    /// An accelerometer sample in m/s².
    #[serde(rename = "accelerometer")]
    Accelerometer { x: f32, y: f32, z: f32 },

    /// A gyroscope sample in rad/s.
    #[serde(rename = "gyroscope")]
    Gyroscope { x: f32, y: f32, z: f32 },
}

/// Field-less discriminant of [`EventKind`].
///
/// The CSV layout carries no type information, so a CSV line can only be
/// decoded when the caller already knows which control produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Slider,
    Switch,
    Button,
    DPad,
    JoyStick,
    SteeringWheel,
    Accelerometer,
    Gyroscope,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 8] = [
        Self::Slider,
        Self::Switch,
        Self::Button,
        Self::DPad,
        Self::JoyStick,
        Self::SteeringWheel,
        Self::Accelerometer,
        Self::Gyroscope,
    ];

    /// Returns the `"type"` tag used in the JSON encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slider => "slider",
            Self::Switch => "switch",
            Self::Button => "button",
            Self::DPad => "dpad",
            Self::JoyStick => "joystick",
            Self::SteeringWheel => "steering_wheel",
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
        }
    }

    /// Number of positional CSV fields after the id.
    pub fn field_count(self) -> usize {
        match self {
            Self::Slider | Self::Switch | Self::Button | Self::SteeringWheel => 1,
            Self::DPad | Self::JoyStick => 2,
            Self::Accelerometer | Self::Gyroscope => 3,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{s}'"))
    }
}

impl EventKind {
    /// Returns the discriminant of this payload.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Slider { .. } => EventType::Slider,
            Self::Switch { .. } => EventType::Switch,
            Self::Button { .. } => EventType::Button,
            Self::DPad { .. } => EventType::DPad,
            Self::JoyStick { .. } => EventType::JoyStick,
            Self::SteeringWheel { .. } => EventType::SteeringWheel,
            Self::Accelerometer { .. } => EventType::Accelerometer,
            Self::Gyroscope { .. } => EventType::Gyroscope,
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// One discrete state change of a control or sensor, destined for the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The identifier the user bound to the control in the pad editor.
    pub id: String,
    /// The control-specific payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Creates an event for the control bound to `id`.
    pub fn new(id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Returns the discriminant of the payload.
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
