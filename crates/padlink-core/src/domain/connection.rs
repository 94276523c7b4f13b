//! Connection discriminants, the persisted connection row, and the
//! transport-qualified connection state machine.
//!
//! # State machine
//!
//! ```text
//!                    ┌──────────────► CONNECTION_FAILED ──┐
//!                    │                                    │
//!  NONE ──► CONNECTING ──► CONNECTED ──► DISCONNECTING ──►│──► DISCONNECTED
//!    ▲               │        │               ▲           │         │
//!    │               ├────────┼───────────────┘           │         │
//!    │               └────────┼──► CONNECTION_TIMEOUT ────┘         │
//!    │                        └──────── (link lost) ────────────────┤
//!    └──────────────────────────── (new setup) ◄────────────────────┘
//! ```
//!
//! Every state except `NONE` is qualified by the transport that raised it,
//! so `TCP_CONNECTED` and `MQTT_CONNECTED` are distinct values.  The
//! [`ConnectionState::can_transition_to`] table is the single authority on
//! which edges are legal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::transport::{ConfigError, TransportConfig};

// ── Connection type ───────────────────────────────────────────────────────────

/// The persisted transport discriminant stored next to each control pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "WEBSOCKET")]
    WebSocket,
    #[serde(rename = "BLUETOOTH")]
    Bluetooth,
    #[serde(rename = "BLUETOOTH_LE")]
    BluetoothLe,
    #[serde(rename = "MQTT_V3")]
    MqttV3,
    #[serde(rename = "MQTT_V5")]
    MqttV5,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 6] = [
        Self::Tcp,
        Self::WebSocket,
        Self::Bluetooth,
        Self::BluetoothLe,
        Self::MqttV3,
        Self::MqttV5,
    ];

    /// Returns the persisted string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::WebSocket => "WEBSOCKET",
            Self::Bluetooth => "BLUETOOTH",
            Self::BluetoothLe => "BLUETOOTH_LE",
            Self::MqttV3 => "MQTT_V3",
            Self::MqttV5 => "MQTT_V5",
        }
    }

    /// Returns the transport whose states this connection type raises.
    ///
    /// Both MQTT versions share the `MQTT_*` states.
    pub fn transport_kind(self) -> TransportKind {
        match self {
            Self::Tcp => TransportKind::Tcp,
            Self::WebSocket => TransportKind::WebSocket,
            Self::Bluetooth => TransportKind::Bluetooth,
            Self::BluetoothLe => TransportKind::BluetoothLe,
            Self::MqttV3 | Self::MqttV5 => TransportKind::Mqtt,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownConnectionType(s.to_string()))
    }
}

/// The transport prefix carried by every non-`NONE` connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    WebSocket,
    Bluetooth,
    BluetoothLe,
    Mqtt,
}

impl TransportKind {
    /// Upper-snake prefix used when a state is displayed.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::WebSocket => "WEBSOCKET",
            Self::Bluetooth => "BLUETOOTH",
            Self::BluetoothLe => "BLUETOOTH_LE",
            Self::Mqtt => "MQTT",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// ── Connection state ──────────────────────────────────────────────────────────

/// The transport-independent part of a connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    ConnectionFailed,
    ConnectionTimeout,
}

impl ConnectionPhase {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnecting => "DISCONNECTING",
            Self::Disconnected => "DISCONNECTED",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
        }
    }
}

/// Closed set of transport-qualified connection states.
///
/// `ConnectionState::Tcp(ConnectionPhase::Connected)` displays as
/// `TCP_CONNECTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Freshly constructed; `setup()` has not run yet.
    #[default]
    None,
    Tcp(ConnectionPhase),
    WebSocket(ConnectionPhase),
    Bluetooth(ConnectionPhase),
    BluetoothLe(ConnectionPhase),
    Mqtt(ConnectionPhase),
}

impl ConnectionState {
    /// Builds the state `phase` qualified by `kind`.
    pub fn of(kind: TransportKind, phase: ConnectionPhase) -> Self {
        match kind {
            TransportKind::Tcp => Self::Tcp(phase),
            TransportKind::WebSocket => Self::WebSocket(phase),
            TransportKind::Bluetooth => Self::Bluetooth(phase),
            TransportKind::BluetoothLe => Self::BluetoothLe(phase),
            TransportKind::Mqtt => Self::Mqtt(phase),
        }
    }

    /// Returns the transport that raised this state, or `None` for `NONE`.
    pub fn kind(&self) -> Option<TransportKind> {
        match self {
            Self::None => None,
            Self::Tcp(_) => Some(TransportKind::Tcp),
            Self::WebSocket(_) => Some(TransportKind::WebSocket),
            Self::Bluetooth(_) => Some(TransportKind::Bluetooth),
            Self::BluetoothLe(_) => Some(TransportKind::BluetoothLe),
            Self::Mqtt(_) => Some(TransportKind::Mqtt),
        }
    }

    /// Returns the phase, or `None` for `NONE`.
    pub fn phase(&self) -> Option<ConnectionPhase> {
        match *self {
            Self::None => None,
            Self::Tcp(p)
            | Self::WebSocket(p)
            | Self::Bluetooth(p)
            | Self::BluetoothLe(p)
            | Self::Mqtt(p) => Some(p),
        }
    }

    /// `true` only in `*_CONNECTED`.
    pub fn is_connected(&self) -> bool {
        self.phase() == Some(ConnectionPhase::Connected)
    }

    /// `true` in the states that end a session attempt: `*_DISCONNECTED`,
    /// `*_CONNECTION_FAILED` and `*_CONNECTION_TIMEOUT`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase(),
            Some(
                ConnectionPhase::Disconnected
                    | ConnectionPhase::ConnectionFailed
                    | ConnectionPhase::ConnectionTimeout
            )
        )
    }

    /// `true` when a new `setup()` may start from this state.
    pub fn accepts_setup(&self) -> bool {
        matches!(self.phase(), None | Some(ConnectionPhase::Disconnected))
    }

    /// Checks whether moving from `self` to `next` is a legal edge.
    ///
    /// Transitions never change the transport prefix, and `NONE` is never a
    /// target.
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionPhase::*;

        let Some(next_phase) = next.phase() else {
            return false;
        };
        match self.kind() {
            Some(kind) if Some(kind) != next.kind() => return false,
            _ => {}
        }

        match (self.phase(), next_phase) {
            (None, Connecting) => true,
            (Some(Disconnected), Connecting) => true,
            (Some(Connecting), Connected | ConnectionFailed | ConnectionTimeout | Disconnecting) => {
                true
            }
            (Some(Connected), Disconnecting | Disconnected) => true,
            (Some(ConnectionFailed | ConnectionTimeout), Disconnecting) => true,
            (Some(Disconnecting), Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.phase()) {
            (Some(kind), Some(phase)) => write!(f, "{}_{}", kind.prefix(), phase.suffix()),
            _ => f.write_str("NONE"),
        }
    }
}

// ── Persisted row ─────────────────────────────────────────────────────────────

/// The connection settings stored for one control pad.
///
/// `config_json` is opaque to storage; it is only parsed when the play screen
/// builds a connection from this row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub id: i64,
    pub control_pad_id: i64,
    pub connection_type: ConnectionType,
    pub config_json: String,
}

impl ConnectionConfig {
    /// Builds a row from an already-validated transport config.
    pub fn new(
        id: i64,
        control_pad_id: i64,
        connection_type: ConnectionType,
        config: &TransportConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            id,
            control_pad_id,
            connection_type,
            config_json: config.to_json()?,
        })
    }

    /// Parses and validates the stored JSON for this row's connection type.
    pub fn transport_config(&self) -> Result<TransportConfig, ConfigError> {
        TransportConfig::parse(self.connection_type, &self.config_json)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
