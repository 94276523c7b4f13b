//! Builds a live [`Connection`] from a stored connection type and config JSON.
//!
//! The factory is the single place where the persisted discriminant picks the
//! concrete transport.  It also owns the radio adapters, so platform glue
//! injects real Bluetooth support once and every session picks it up.

use std::io;
use std::sync::Arc;

use padlink_core::{ConfigError, ConnectionConfig, ConnectionType, TransportConfig, WebSocketConfig};
use thiserror::Error;
use tracing::debug;

use crate::infrastructure::connection::ble::{BleCentral, BleTransport, NoBleCentral};
use crate::infrastructure::connection::bluetooth::{BluetoothAdapter, BluetoothTransport, NoBluetoothAdapter};
use crate::infrastructure::connection::mqtt::{MqttTransport, MqttVersion};
use crate::infrastructure::connection::tcp::TcpTransport;
use crate::infrastructure::connection::websocket::{WebSocketClientTransport, WebSocketServerTransport};
use crate::infrastructure::connection::{Connection, Transport};

/// Errors returned by [`ConnectionFactory::build`].
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The config JSON is malformed, does not match the connection type, or
    /// holds unusable values.
    #[error("invalid connection configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// The connection worker could not be started.
    #[error("failed to start connection worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Creates connections for play sessions.
#[derive(Clone)]
pub struct ConnectionFactory {
    bluetooth: Arc<dyn BluetoothAdapter>,
    ble: Arc<dyn BleCentral>,
}

impl Default for ConnectionFactory {
    /// A factory whose Bluetooth transports always report a disabled adapter.
    fn default() -> Self {
        Self {
            bluetooth: Arc::new(NoBluetoothAdapter),
            ble: Arc::new(NoBleCentral),
        }
    }
}

impl ConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `adapter` for `BLUETOOTH` connections.
    pub fn with_bluetooth(mut self, adapter: Arc<dyn BluetoothAdapter>) -> Self {
        self.bluetooth = adapter;
        self
    }

    /// Uses `central` for `BLUETOOTH_LE` connections.
    pub fn with_ble(mut self, central: Arc<dyn BleCentral>) -> Self {
        self.ble = central;
        self
    }

    /// Parses `config_json` for `connection_type` and starts a connection.
    ///
    /// The returned connection is in `NONE`; call
    /// [`setup`](Connection::setup) to connect.
    ///
    /// # Errors
    ///
    /// [`FactoryError::Configuration`] when the JSON does not describe a valid
    /// config for `connection_type`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use padlink::ConnectionFactory;
    /// use padlink_core::ConnectionType;
    ///
    /// let factory = ConnectionFactory::new();
    /// let conn = factory
    ///     .build(ConnectionType::Tcp, r#"{"host":"127.0.0.1","port":9002}"#)
    ///     .unwrap();
    /// conn.setup();
    /// ```
    pub fn build(&self, connection_type: ConnectionType, config_json: &str) -> Result<Connection, FactoryError> {
        let config = TransportConfig::parse(connection_type, config_json)?;
        debug!(%connection_type, "building connection");

        let transport: Box<dyn Transport> = match config {
            TransportConfig::Tcp(c) => Box::new(TcpTransport::new(c)),
            TransportConfig::WebSocket(WebSocketConfig::Client(c)) => Box::new(WebSocketClientTransport::new(c)),
            TransportConfig::WebSocket(WebSocketConfig::Server(c)) => Box::new(WebSocketServerTransport::new(c)),
            TransportConfig::Bluetooth(c) => Box::new(BluetoothTransport::new(c, Arc::clone(&self.bluetooth))),
            TransportConfig::BluetoothLe(c) => Box::new(BleTransport::new(c, Arc::clone(&self.ble))),
            TransportConfig::Mqtt(c) => {
                let version = if connection_type == ConnectionType::MqttV5 {
                    MqttVersion::V5
                } else {
                    MqttVersion::V3
                };
                Box::new(MqttTransport::new(c, version))
            }
        };

        Ok(Connection::spawn(connection_type, transport)?)
    }

    /// Builds a connection from a persisted settings row.
    pub fn build_from_config(&self, row: &ConnectionConfig) -> Result<Connection, FactoryError> {
        self.build(row.connection_type, &row.config_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use padlink_core::ConnectionState;

    #[tokio::test]
    async fn test_build_tcp_starts_in_none() {
        let conn = ConnectionFactory::new()
            .build(ConnectionType::Tcp, r#"{"host":"127.0.0.1","port":9002}"#)
            .unwrap();

        assert_eq!(conn.state(), ConnectionState::None);
        assert_eq!(conn.connection_type(), ConnectionType::Tcp);
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let result = ConnectionFactory::new().build(ConnectionType::Tcp, "{not json");
        assert!(matches!(result, Err(FactoryError::Configuration(_))));
    }

    #[test]
    fn test_mismatched_config_is_configuration_error() {
        // An MQTT config stored under a TCP row.
        let result = ConnectionFactory::new().build(
            ConnectionType::Tcp,
            r#"{"broker":"localhost","topic":"pad"}"#,
        );
        assert!(matches!(
            result,
            Err(FactoryError::Configuration(ConfigError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_invalid_value_is_configuration_error() {
        let result = ConnectionFactory::new().build(
            ConnectionType::MqttV3,
            r#"{"broker":"ssl://broker:8883","topic":"pad"}"#,
        );
        assert!(matches!(
            result,
            Err(FactoryError::Configuration(ConfigError::Invalid { field: "broker", .. }))
        ));
    }

    #[tokio::test]
    async fn test_build_from_config_row() {
        let row = ConnectionConfig {
            id: 1,
            control_pad_id: 2,
            connection_type: ConnectionType::MqttV5,
            config_json: r#"{"broker":"localhost","topic":"pad/events"}"#.to_string(),
        };

        let conn = ConnectionFactory::new().build_from_config(&row).unwrap();

        assert_eq!(conn.connection_type(), ConnectionType::MqttV5);
    }
}
