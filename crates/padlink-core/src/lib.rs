//! # padlink-core
//!
//! Shared library for padlink containing the event encoder, the transport
//! configuration value objects, and the connection state model.
//!
//! This crate is used by the connection engine and by anything that persists
//! or edits control-pad settings.  It has zero dependencies on sockets, radio
//! stacks, or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! padlink turns a screen into a virtual control pad.  Every interaction with
//! a control (a button press, a slider drag, a joystick move) or a sensor
//! sample becomes a typed [`Event`] that is streamed to a remote receiver over
//! one of five transports: raw TCP, WebSocket, Bluetooth classic (RFCOMM),
//! Bluetooth LE (GATT) or MQTT.
//!
//! This crate (`padlink-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure value types: events, the per-transport configuration
//!   structs that are stored as JSON next to each control pad, and the
//!   transport-qualified [`ConnectionState`] enum.
//!
//! - **`protocol`** – How an event becomes text on the wire.  The
//!   [`EventEncoder`] renders an event as compact tagged JSON
//!   (`{"id":"fire","type":"button","state":"pressed"}`) or positional CSV
//!   (`fire,pressed`), and the decoders turn those strings back into events.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `padlink_core::Event` instead of `padlink_core::domain::event::Event`.
pub use domain::connection::{
    ConnectionConfig, ConnectionPhase, ConnectionState, ConnectionType, TransportKind,
};
pub use domain::event::{ButtonState, DPadButton, Event, EventKind, EventType};
pub use domain::transport::{
    BluetoothConfig, BluetoothLeConfig, ConfigError, ConfigJson, MqttConfig, MqttCredentials,
    RemoteDevice, TcpConfig, TransportConfig, WebSocketClientConfig, WebSocketConfig,
    WebSocketServerConfig,
};
pub use protocol::encoder::{
    decode, decode_csv, decode_json, DataFormat, DecodeError, EncodeError, EventEncoder,
};
