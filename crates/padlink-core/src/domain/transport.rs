//! Per-transport configuration value objects.
//!
//! The settings screen stores one of these structs as a JSON blob next to
//! each control pad (see [`crate::ConnectionConfig`]).  The blob is only
//! parsed and validated when a connection is built, so a stale or
//! hand-edited blob surfaces as a [`ConfigError`] instead of a crash.
//!
//! # JSON field names
//!
//! Field names are camelCase (`timeoutSecs`, `listenOnAllInterfaces`), and the
//! Bluetooth UUID fields keep their historical all-caps suffix
//! (`serviceUUID`, `characteristicUUID`, `descriptorUUID`).
//!
//! # Immutability
//!
//! None of these types expose setters.  The connection engine wraps them in an
//! `Arc` and shares them with background tasks without any locking.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::connection::ConnectionType;

/// Default connect-phase timeout for TCP and WebSocket clients.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Serial Port Profile UUID, the default RFCOMM service.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// Client Characteristic Configuration Descriptor, used to enable notifications.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// Default MQTT broker port for plain TCP connections.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Placeholder written over the MQTT password when a config is exported.
pub const MASKED_PASSWORD: &str = "********";

/// Errors raised while parsing or validating a transport configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config JSON could not be deserialized into the expected struct.
    #[error("malformed {connection_type} config: {source}")]
    Malformed {
        connection_type: ConnectionType,
        #[source]
        source: serde_json::Error,
    },

    /// The config could not be serialized back to JSON.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A field parsed but holds a value the transport cannot use.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The persisted connection type string is not one we know.
    #[error("unknown connection type '{0}'")]
    UnknownConnectionType(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// ── JSON round-trip ───────────────────────────────────────────────────────────

/// JSON persistence for configuration value objects.
///
/// Blanket-implemented for every serde type so each config gets
/// `to_json`/`from_json` without repeating the error mapping.
pub trait ConfigJson: Serialize + DeserializeOwned {
    /// Serializes the config to compact JSON.
    fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(ConfigError::Serialize)
    }

    /// Parses a config from JSON, tagging failures with `connection_type`.
    fn from_json_as(connection_type: ConnectionType, json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Malformed {
            connection_type,
            source,
        })
    }
}

impl<T: Serialize + DeserializeOwned> ConfigJson for T {}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_spp_uuid() -> Uuid {
    SPP_UUID
}

fn default_cccd_uuid() -> Uuid {
    CCCD_UUID
}

fn validate_timeout(secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::invalid("timeoutSecs", "must be at least 1 second"));
    }
    Ok(())
}

fn validate_port(port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::invalid("port", "must be between 1 and 65535"));
    }
    Ok(())
}

// ── TCP ───────────────────────────────────────────────────────────────────────

/// Raw TCP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpConfig {
    /// Receiver host name or IP address.
    pub host: String,
    /// Receiver port.
    pub port: u16,
    /// Connect-phase timeout in seconds.  Does not bound individual writes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        validate_port(self.port)?;
        validate_timeout(self.timeout_secs)
    }
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

/// Outbound WebSocket client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClientConfig {
    /// `ws://` or `wss://` URL of the receiver.
    pub url: String,
    /// Connect-phase timeout in seconds, covering TCP connect and handshake.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Embedded WebSocket server settings.
///
/// The server accepts one tracked peer at a time; see the WebSocket transport
/// for the replacement rule when a second peer connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// `true` binds `0.0.0.0`; `false` binds loopback only.
    #[serde(default)]
    pub listen_on_all_interfaces: bool,
    /// How long to wait for the first peer.  `None` waits until torn down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_timeout_secs: Option<u64>,
}

/// WebSocket settings; the `mode` field selects client or server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WebSocketConfig {
    Client(WebSocketClientConfig),
    Server(WebSocketServerConfig),
}

impl WebSocketConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Client(client) => {
                if !(client.url.starts_with("ws://") || client.url.starts_with("wss://")) {
                    return Err(ConfigError::invalid(
                        "url",
                        format!("'{}' is not a ws:// or wss:// URL", client.url),
                    ));
                }
                validate_timeout(client.timeout_secs)
            }
            Self::Server(server) => {
                validate_port(server.port)?;
                match server.accept_timeout_secs {
                    Some(secs) => validate_timeout(secs),
                    None => Ok(()),
                }
            }
        }
    }
}

// ── Bluetooth ─────────────────────────────────────────────────────────────────

/// A previously paired radio peer.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDevice {
    /// Hardware address, e.g. `00:11:22:AA:BB:CC`.
    pub address: String,
    /// Friendly name shown in the settings screen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RemoteDevice {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns `true` when both refer to the same hardware address.
    pub fn same_address(&self, other: &RemoteDevice) -> bool {
        self.address.eq_ignore_ascii_case(&other.address)
    }
}

impl PartialEq for RemoteDevice {
    fn eq(&self, other: &Self) -> bool {
        self.same_address(other) && self.name == other.name
    }
}

/// Classic Bluetooth (RFCOMM) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothConfig {
    /// RFCOMM service to connect to.
    #[serde(rename = "serviceUUID", default = "default_spp_uuid")]
    pub service_uuid: Uuid,
    /// The bonded device to connect to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_device: Option<RemoteDevice>,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            service_uuid: SPP_UUID,
            remote_device: None,
        }
    }
}

impl BluetoothConfig {
    pub fn for_device(device: RemoteDevice) -> Self {
        Self {
            remote_device: Some(device),
            ..Self::default()
        }
    }

    /// Nothing to check eagerly: a missing device is reported as a connect
    /// failure so the user sees it on the play screen, not in settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Bluetooth LE (GATT) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothLeConfig {
    /// GATT service that owns the target characteristic.
    #[serde(rename = "serviceUUID")]
    pub service_uuid: Uuid,
    /// Characteristic every event is written to.
    #[serde(rename = "characteristicUUID")]
    pub characteristic_uuid: Uuid,
    /// Descriptor used to enable notifications on the characteristic.
    #[serde(rename = "descriptorUUID", default = "default_cccd_uuid")]
    pub descriptor_uuid: Uuid,
    /// The peripheral to connect to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_device: Option<RemoteDevice>,
}

impl BluetoothLeConfig {
    pub fn new(service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        Self {
            service_uuid,
            characteristic_uuid,
            descriptor_uuid: CCCD_UUID,
            remote_device: None,
        }
    }

    pub fn with_device(mut self, device: RemoteDevice) -> Self {
        self.remote_device = Some(device);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.characteristic_uuid.is_nil() {
            return Err(ConfigError::invalid("characteristicUUID", "must not be nil"));
        }
        if self.service_uuid.is_nil() {
            return Err(ConfigError::invalid("serviceUUID", "must not be nil"));
        }
        Ok(())
    }
}

// ── MQTT ──────────────────────────────────────────────────────────────────────

/// Broker login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttCredentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl MqttCredentials {
    /// Returns `true` when the password has been replaced by [`MASKED_PASSWORD`].
    pub fn is_masked(&self) -> bool {
        self.password == MASKED_PASSWORD
    }
}

/// MQTT publisher settings, shared by the v3.1.1 and v5 transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    /// `host`, `host:port`, `tcp://host:port` or `mqtt://host:port`.
    pub broker: String,
    /// Topic every event is published to.
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<MqttCredentials>,
    /// Publish QoS.  Only 0 is accepted: delivery is fire-and-forget.
    #[serde(default)]
    pub qos: u8,
    /// Client identifier; a random one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl MqttConfig {
    pub fn new(broker: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            topic: topic.into(),
            credentials: None,
            qos: 0,
            client_id: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(MqttCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Splits [`broker`](Self::broker) into host and port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for TLS schemes, empty hosts, or a
    /// port that is not a number.
    pub fn broker_address(&self) -> Result<(String, u16), ConfigError> {
        let raw = self.broker.trim();
        let rest = match raw.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => {
                return Err(ConfigError::invalid(
                    "broker",
                    format!("unsupported scheme '{scheme}://'"),
                ))
            }
            None => raw,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ConfigError::invalid("broker", format!("bad port '{port}'")))?;
                (host, port)
            }
            None => (rest, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            return Err(ConfigError::invalid("broker", "missing host"));
        }
        validate_port(port)?;
        Ok((host.to_string(), port))
    }

    /// Returns a copy safe to export: the password is replaced by a mask.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(credentials) = copy.credentials.as_mut() {
            credentials.password = MASKED_PASSWORD.to_string();
        }
        copy
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker_address()?;
        if self.topic.is_empty() {
            return Err(ConfigError::invalid("topic", "must not be empty"));
        }
        if self.topic.contains(['+', '#']) {
            return Err(ConfigError::invalid(
                "topic",
                "wildcards are not allowed in a publish topic",
            ));
        }
        if let Some(id) = &self.client_id {
            if id.is_empty() || id.starts_with(char::is_whitespace) {
                return Err(ConfigError::invalid(
                    "clientId",
                    "must not be empty or start with whitespace",
                ));
            }
        }
        if self.qos != 0 {
            return Err(ConfigError::invalid(
                "qos",
                format!("{} is not supported; events are published at QoS 0", self.qos),
            ));
        }
        Ok(())
    }
}

// ── Closed variant set ────────────────────────────────────────────────────────

/// A parsed and validated configuration for one of the five transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Tcp(TcpConfig),
    WebSocket(WebSocketConfig),
    Bluetooth(BluetoothConfig),
    BluetoothLe(BluetoothLeConfig),
    /// MQTT; the protocol version comes from the connection type.
    Mqtt(MqttConfig),
}

impl TransportConfig {
    /// Parses and validates `json` as the config for `connection_type`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Malformed`] when the JSON does not match the struct
    /// expected for `connection_type`; [`ConfigError::Invalid`] when it
    /// parses but a value is unusable.
    pub fn parse(connection_type: ConnectionType, json: &str) -> Result<Self, ConfigError> {
        let config = match connection_type {
            ConnectionType::Tcp => Self::Tcp(TcpConfig::from_json_as(connection_type, json)?),
            ConnectionType::WebSocket => {
                Self::WebSocket(WebSocketConfig::from_json_as(connection_type, json)?)
            }
            ConnectionType::Bluetooth => {
                Self::Bluetooth(BluetoothConfig::from_json_as(connection_type, json)?)
            }
            ConnectionType::BluetoothLe => {
                Self::BluetoothLe(BluetoothLeConfig::from_json_as(connection_type, json)?)
            }
            ConnectionType::MqttV3 | ConnectionType::MqttV5 => {
                Self::Mqtt(MqttConfig::from_json_as(connection_type, json)?)
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Tcp(c) => c.validate(),
            Self::WebSocket(c) => c.validate(),
            Self::Bluetooth(c) => c.validate(),
            Self::BluetoothLe(c) => c.validate(),
            Self::Mqtt(c) => c.validate(),
        }
    }

    /// Serializes the inner config to the JSON blob stored in the row.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        match self {
            Self::Tcp(c) => c.to_json(),
            Self::WebSocket(c) => c.to_json(),
            Self::Bluetooth(c) => c.to_json(),
            Self::BluetoothLe(c) => c.to_json(),
            Self::Mqtt(c) => c.to_json(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_config_defaults_timeout_when_absent() {
        let cfg = TcpConfig::from_json_as(ConnectionType::Tcp, r#"{"host":"10.0.0.2","port":9002}"#)
            .unwrap();
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_tcp_config_json_uses_camel_case() {
        let json = TcpConfig::new("127.0.0.1", 9002).with_timeout_secs(3).to_json().unwrap();
        assert_eq!(json, r#"{"host":"127.0.0.1","port":9002,"timeoutSecs":3}"#);
    }

    #[test]
    fn test_tcp_config_rejects_empty_host() {
        let err = TcpConfig::new("  ", 9002).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "host", .. }));
    }

    #[test]
    fn test_tcp_config_rejects_zero_timeout() {
        let err = TcpConfig::new("h", 1).with_timeout_secs(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "timeoutSecs", .. }));
    }

    #[test]
    fn test_websocket_config_mode_tag() {
        let server: WebSocketConfig =
            serde_json::from_str(r#"{"mode":"server","port":8080,"listenOnAllInterfaces":true}"#)
                .unwrap();
        assert_eq!(
            server,
            WebSocketConfig::Server(WebSocketServerConfig {
                port: 8080,
                listen_on_all_interfaces: true,
                accept_timeout_secs: None,
            })
        );
    }

    #[test]
    fn test_websocket_client_rejects_http_url() {
        let cfg = WebSocketConfig::Client(WebSocketClientConfig {
            url: "http://example.com".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "url", .. })
        ));
    }

    #[test]
    fn test_bluetooth_config_defaults_to_spp() {
        let cfg: BluetoothConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.service_uuid, SPP_UUID);
        assert_eq!(
            SPP_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_bluetooth_le_config_uses_uuid_field_names() {
        let cfg = BluetoothLeConfig::new(Uuid::from_u128(1), Uuid::from_u128(2));
        let json = cfg.to_json().unwrap();
        assert!(json.contains("\"serviceUUID\""));
        assert!(json.contains("\"characteristicUUID\""));
        assert!(json.contains("\"descriptorUUID\""));
    }

    #[test]
    fn test_remote_device_address_comparison_ignores_case() {
        let a = RemoteDevice::new("aa:bb:cc:dd:ee:ff");
        let b = RemoteDevice::new("AA:BB:CC:DD:EE:FF");
        assert!(a.same_address(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_mqtt_broker_address_forms() {
        let cases = [
            ("broker.local", ("broker.local", 1883)),
            ("broker.local:1884", ("broker.local", 1884)),
            ("tcp://10.0.0.1:1885", ("10.0.0.1", 1885)),
            ("mqtt://10.0.0.1", ("10.0.0.1", 1883)),
        ];
        for (broker, (host, port)) in cases {
            let cfg = MqttConfig::new(broker, "pad/events");
            assert_eq!(cfg.broker_address().unwrap(), (host.to_string(), port), "{broker}");
        }
    }

    #[test]
    fn test_mqtt_broker_rejects_tls_scheme() {
        let cfg = MqttConfig::new("ssl://broker:8883", "pad");
        assert!(cfg.broker_address().is_err());
    }

    #[test]
    fn test_mqtt_rejects_nonzero_qos() {
        let mut cfg = MqttConfig::new("broker", "pad");
        cfg.qos = 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "qos", .. })
        ));
    }

    #[test]
    fn test_mqtt_rejects_blank_client_id() {
        let mut cfg = MqttConfig::new("broker", "pad");
        cfg.client_id = Some(" pad".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "clientId", .. })
        ));
    }

    #[test]
    fn test_mqtt_rejects_wildcard_topic() {
        let cfg = MqttConfig::new("broker", "pad/#");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "topic", .. })
        ));
    }

    #[test]
    fn test_mqtt_redacted_masks_password_only() {
        // Arrange
        let cfg = MqttConfig::new("broker", "pad").with_credentials("alice", "hunter2");

        // Act
        let redacted = cfg.redacted();

        // Assert
        let creds = redacted.credentials.as_ref().unwrap();
        assert_eq!(creds.username, "alice");
        assert!(creds.is_masked());
        assert_eq!(redacted.broker, cfg.broker);
        assert!(!cfg.credentials.as_ref().unwrap().is_masked());
    }

    #[test]
    fn test_parse_reports_type_mismatch_as_malformed() {
        // A TCP blob stored under an MQTT row must not crash the factory.
        let err = TransportConfig::parse(
            ConnectionType::MqttV3,
            r#"{"host":"127.0.0.1","port":9002}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_parse_reports_garbage_as_malformed() {
        let err = TransportConfig::parse(ConnectionType::Tcp, "not json").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Malformed {
                connection_type: ConnectionType::Tcp,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_runs_validation() {
        let err = TransportConfig::parse(ConnectionType::Tcp, r#"{"host":"h","port":0}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "port", .. }));
    }
}
