//! Bluetooth LE (GATT) transport.
//!
//! Each event is one GATT characteristic write.  There is no fragmentation:
//! payloads longer than `mtu - 3` bytes are logged and written anyway, and the
//! platform stack decides what to do with them.
//!
//! Connect sequence:
//!
//! 1. [`BleCentral::connect`] to the configured peripheral.
//! 2. Discover services and locate the configured service and characteristic.
//! 3. Require the characteristic to be writable, with or without response.
//! 4. If it can notify or indicate and exposes the configured descriptor,
//!    enable notifications.  A failure here is only logged.
//!
//! Platform disconnect callbacks report link loss through the
//! [`LinkMonitor`] handed to the central.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use padlink_core::{BluetoothLeConfig, RemoteDevice, TransportKind};
use tracing::{info, warn};
use uuid::Uuid;

use super::{LinkError, LinkMonitor, Transport};

/// Fixed connect-phase timeout for GATT.
pub const BLE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of every ATT write taken by the opcode and handle.
const ATT_WRITE_OVERHEAD: usize = 3;

// ── GATT model ────────────────────────────────────────────────────────────────

/// The subset of characteristic properties the transport cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }

    pub fn can_notify(&self) -> bool {
        self.notify || self.indicate
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// UUIDs of the descriptors attached to this characteristic.
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Addresses one characteristic inside one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattTarget {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// ATT write procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

// ── Platform seams ────────────────────────────────────────────────────────────

/// An established GATT client session with one peripheral.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattSession: Send {
    async fn discover_services(&mut self) -> Result<Vec<GattService>, LinkError>;

    /// Writes the enable-notification value to `descriptor` of `target`.
    async fn enable_notifications(&mut self, target: GattTarget, descriptor: Uuid) -> Result<(), LinkError>;

    async fn write(&mut self, target: GattTarget, value: &[u8], kind: WriteKind) -> Result<(), LinkError>;

    /// Negotiated ATT MTU in bytes.
    fn mtu(&self) -> usize;

    async fn disconnect(&mut self);
}

/// Platform access to the Bluetooth LE radio in the central role.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleCentral: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Connects to `device`.  The platform reports a later disconnect through
    /// `link`.
    async fn connect(&self, device: &RemoteDevice, link: LinkMonitor) -> Result<Box<dyn GattSession>, LinkError>;
}

/// Central for hosts without Bluetooth LE support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBleCentral;

#[async_trait]
impl BleCentral for NoBleCentral {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn connect(&self, _device: &RemoteDevice, _link: LinkMonitor) -> Result<Box<dyn GattSession>, LinkError> {
        Err(LinkError::AdapterUnavailable(
            "Bluetooth LE is not available on this host".to_string(),
        ))
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

pub struct BleTransport {
    config: Arc<BluetoothLeConfig>,
    central: Arc<dyn BleCentral>,
    session: Option<Box<dyn GattSession>>,
    write_kind: WriteKind,
}

impl BleTransport {
    pub fn new(config: BluetoothLeConfig, central: Arc<dyn BleCentral>) -> Self {
        Self {
            config: Arc::new(config),
            central,
            session: None,
            write_kind: WriteKind::WithoutResponse,
        }
    }

    fn target(&self) -> GattTarget {
        GattTarget {
            service: self.config.service_uuid,
            characteristic: self.config.characteristic_uuid,
        }
    }
}

/// Finds the configured characteristic inside the configured service.
fn locate(services: &[GattService], target: GattTarget) -> Result<&GattCharacteristic, LinkError> {
    let service = services
        .iter()
        .find(|s| s.uuid == target.service)
        .ok_or_else(|| LinkError::Failed(format!("service {} not found", target.service)))?;
    service
        .characteristics
        .iter()
        .find(|c| c.uuid == target.characteristic)
        .ok_or_else(|| {
            LinkError::Failed(format!(
                "characteristic {} not found in service {}",
                target.characteristic, target.service
            ))
        })
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::BluetoothLe
    }

    fn connect_timeout(&self) -> Option<Duration> {
        Some(BLE_CONNECT_TIMEOUT)
    }

    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError> {
        if !self.central.is_enabled() {
            return Err(LinkError::AdapterUnavailable(
                "Bluetooth adapter is disabled".to_string(),
            ));
        }
        let config = Arc::clone(&self.config);
        let device = config
            .remote_device
            .as_ref()
            .ok_or_else(|| LinkError::Failed("no remote device configured".to_string()))?;
        let target = self.target();

        // Stored before discovery so a failure or timeout below still
        // disconnects in close().
        let session = self.session.insert(self.central.connect(device, link).await?);

        let services = session.discover_services().await?;
        let characteristic = locate(&services, target)?;
        let properties = characteristic.properties;
        if !properties.is_writable() {
            return Err(LinkError::Failed(format!(
                "characteristic {} is not writable",
                target.characteristic
            )));
        }
        // Unacknowledged writes keep latency low for high-rate sensor events.
        self.write_kind = if properties.write_without_response {
            WriteKind::WithoutResponse
        } else {
            WriteKind::WithResponse
        };

        if properties.can_notify() && characteristic.descriptors.contains(&config.descriptor_uuid) {
            if let Err(e) = session
                .enable_notifications(target, config.descriptor_uuid)
                .await
            {
                warn!(characteristic = %target.characteristic, error = %e, "could not enable notifications");
            }
        }

        info!(
            device = %device.address,
            characteristic = %target.characteristic,
            mtu = session.mtu(),
            "GATT session ready"
        );
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), LinkError> {
        let target = self.target();
        let kind = self.write_kind;
        let session = self.session.as_mut().ok_or(LinkError::NotConnected)?;

        let limit = session.mtu().saturating_sub(ATT_WRITE_OVERHEAD);
        if data.len() > limit {
            warn!(bytes = data.len(), limit, "event exceeds one ATT payload; writing unfragmented");
        }
        session.write(target, data.as_bytes(), kind).await
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.disconnect().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use padlink_core::domain::transport::CCCD_UUID;

    const SERVICE: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);
    const RX_CHAR: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);

    fn config() -> BluetoothLeConfig {
        BluetoothLeConfig::new(SERVICE, RX_CHAR).with_device(RemoteDevice::new("C0:FF:EE:00:00:01"))
    }

    fn services(properties: CharacteristicProperties, descriptors: Vec<Uuid>) -> Vec<GattService> {
        vec![GattService {
            uuid: SERVICE,
            characteristics: vec![GattCharacteristic {
                uuid: RX_CHAR,
                properties,
                descriptors,
            }],
        }]
    }

    fn central_with(session: MockGattSession) -> MockBleCentral {
        let mut session = Some(session);
        let mut central = MockBleCentral::new();
        central.expect_is_enabled().return_const(true);
        central.expect_connect().times(1).returning(move |_, _| {
            let session = session.take().expect("connect called once");
            Ok(Box::new(session) as Box<dyn GattSession>)
        });
        central
    }

    #[tokio::test]
    async fn test_writable_characteristic_connects_and_writes() {
        // Arrange
        let mut session = MockGattSession::new();
        session.expect_discover_services().returning(|| {
            Ok(services(
                CharacteristicProperties {
                    write_without_response: true,
                    ..Default::default()
                },
                vec![],
            ))
        });
        session.expect_enable_notifications().times(0);
        session.expect_mtu().return_const(23usize);
        session
            .expect_write()
            .withf(|target, value, kind| {
                target.characteristic == RX_CHAR
                    && value == b"lights,true"
                    && *kind == WriteKind::WithoutResponse
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        session.expect_disconnect().times(1).return_const(());
        let mut ble = BleTransport::new(config(), Arc::new(central_with(session)));
        let (link, _losses) = LinkMonitor::channel(1);

        // Act
        ble.connect(link).await.unwrap();
        ble.send("lights,true").await.unwrap();
        ble.close().await;

        // Assert – expectations are verified when the mocks drop
    }

    #[tokio::test]
    async fn test_read_only_characteristic_fails_and_disconnects() {
        let mut session = MockGattSession::new();
        session.expect_discover_services().returning(|| {
            Ok(services(
                CharacteristicProperties {
                    notify: true,
                    ..Default::default()
                },
                vec![CCCD_UUID],
            ))
        });
        session.expect_disconnect().times(1).return_const(());
        let mut ble = BleTransport::new(config(), Arc::new(central_with(session)));
        let (link, _losses) = LinkMonitor::channel(1);

        let err = ble.connect(link).await.unwrap_err();
        ble.close().await;

        assert!(err.to_string().contains("not writable"));
    }

    #[tokio::test]
    async fn test_missing_service_fails() {
        let mut session = MockGattSession::new();
        session.expect_discover_services().returning(|| Ok(vec![]));
        session.expect_disconnect().return_const(());
        let mut ble = BleTransport::new(config(), Arc::new(central_with(session)));
        let (link, _losses) = LinkMonitor::channel(1);

        let err = ble.connect(link).await.unwrap_err();

        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_notification_failure_is_not_fatal() {
        let mut session = MockGattSession::new();
        session.expect_discover_services().returning(|| {
            Ok(services(
                CharacteristicProperties {
                    write: true,
                    notify: true,
                    ..Default::default()
                },
                vec![CCCD_UUID],
            ))
        });
        session
            .expect_enable_notifications()
            .with(
                eq(GattTarget {
                    service: SERVICE,
                    characteristic: RX_CHAR,
                }),
                eq(CCCD_UUID),
            )
            .times(1)
            .returning(|_, _| Err(LinkError::Write("descriptor write rejected".into())));
        session.expect_mtu().return_const(185usize);
        session.expect_disconnect().return_const(());
        let mut ble = BleTransport::new(config(), Arc::new(central_with(session)));
        let (link, _losses) = LinkMonitor::channel(1);

        assert!(ble.connect(link).await.is_ok());
        assert_eq!(ble.write_kind, WriteKind::WithResponse);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_written_unfragmented() {
        let mut session = MockGattSession::new();
        session.expect_discover_services().returning(|| {
            Ok(services(
                CharacteristicProperties {
                    write: true,
                    ..Default::default()
                },
                vec![],
            ))
        });
        session.expect_mtu().return_const(23usize);
        session
            .expect_write()
            .withf(|_, value, _| value.len() == 40)
            .times(1)
            .returning(|_, _, _| Ok(()));
        session.expect_disconnect().return_const(());
        let mut ble = BleTransport::new(config(), Arc::new(central_with(session)));
        let (link, _losses) = LinkMonitor::channel(1);
        ble.connect(link).await.unwrap();

        let result = ble.send(&"x".repeat(40)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_central_fails() {
        let mut central = MockBleCentral::new();
        central.expect_is_enabled().return_const(false);
        central.expect_connect().times(0);
        let mut ble = BleTransport::new(config(), Arc::new(central));
        let (link, _losses) = LinkMonitor::channel(1);

        assert!(matches!(
            ble.connect(link).await,
            Err(LinkError::AdapterUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_no_ble_central_reports_unavailable() {
        let (link, _losses) = LinkMonitor::channel(1);
        let result = NoBleCentral
            .connect(&RemoteDevice::new("C0:FF:EE:00:00:01"), link)
            .await;
        assert!(matches!(result, Err(LinkError::AdapterUnavailable(_))));
    }
}
