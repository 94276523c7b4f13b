//! In-memory radio adapters for testing.
//!
//! [`MockBluetoothAdapter`] hands out `tokio::io::duplex` pipes instead of
//! RFCOMM sockets, and [`MockBleCentral`] records GATT writes instead of
//! sending them.  Both are cheap `Clone` handles over shared state, so a test
//! can give one clone to the [`ConnectionFactory`](crate::ConnectionFactory)
//! and keep another to inspect what the connection did.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use padlink_core::RemoteDevice;
use tokio::io::DuplexStream;
use uuid::Uuid;

use super::ble::{
    BleCentral, CharacteristicProperties, GattCharacteristic, GattService, GattSession, GattTarget,
    WriteKind,
};
use super::bluetooth::{BluetoothAdapter, RfcommStream};
use super::{LinkError, LinkMonitor};

/// Buffer size of each in-memory RFCOMM pipe.
const PIPE_CAPACITY: usize = 4096;

/// ATT MTU reported when a test does not pick one.
const DEFAULT_MTU: usize = 23;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Bluetooth classic ─────────────────────────────────────────────────────────

#[derive(Default)]
struct AdapterState {
    enabled: bool,
    bonded: Vec<RemoteDevice>,
    connect_delay: Option<Duration>,
    attempts: u32,
    /// Remote ends of opened channels, oldest first.
    peers: VecDeque<DuplexStream>,
}

/// A classic Bluetooth adapter backed by in-memory pipes.
#[derive(Clone)]
pub struct MockBluetoothAdapter {
    state: Arc<Mutex<AdapterState>>,
}

impl MockBluetoothAdapter {
    /// Creates an enabled adapter with no bonded devices.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AdapterState {
                enabled: true,
                ..AdapterState::default()
            })),
        }
    }

    /// Adds `device` to the bond list.
    pub fn with_bonded(self, device: RemoteDevice) -> Self {
        lock(&self.state).bonded.push(device);
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        lock(&self.state).enabled = enabled;
    }

    /// Makes every RFCOMM connect take `delay`, like a slow radio.
    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.state).connect_delay = Some(delay);
    }

    /// Number of RFCOMM connects attempted so far.
    pub fn attempts(&self) -> u32 {
        lock(&self.state).attempts
    }

    /// Takes the remote end of the oldest channel not yet taken.
    pub fn take_peer(&self) -> Option<DuplexStream> {
        lock(&self.state).peers.pop_front()
    }
}

impl Default for MockBluetoothAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BluetoothAdapter for MockBluetoothAdapter {
    fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    fn bonded_devices(&self) -> Vec<RemoteDevice> {
        lock(&self.state).bonded.clone()
    }

    async fn connect_rfcomm(&self, _device: &RemoteDevice, _service: Uuid) -> io::Result<RfcommStream> {
        let delay = {
            let mut state = lock(&self.state);
            state.attempts += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        lock(&self.state).peers.push_back(remote);
        Ok(Box::new(local))
    }
}

// ── Bluetooth LE ──────────────────────────────────────────────────────────────

/// One recorded GATT write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub target: GattTarget,
    pub value: Vec<u8>,
    pub kind: WriteKind,
}

struct CentralState {
    enabled: bool,
    services: Vec<GattService>,
    mtu: usize,
    writes: Vec<RecordedWrite>,
    notifications: Vec<(GattTarget, Uuid)>,
    link: Option<LinkMonitor>,
    disconnects: u32,
}

/// A Bluetooth LE central whose peripheral lives in memory.
#[derive(Clone)]
pub struct MockBleCentral {
    state: Arc<Mutex<CentralState>>,
}

impl MockBleCentral {
    /// Creates an enabled central whose peripheral exposes `services`.
    pub fn new(services: Vec<GattService>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CentralState {
                enabled: true,
                services,
                mtu: DEFAULT_MTU,
                writes: Vec::new(),
                notifications: Vec::new(),
                link: None,
                disconnects: 0,
            })),
        }
    }

    /// A peripheral with one characteristic that accepts writes and notifies
    /// through `descriptor`.
    pub fn with_writable_characteristic(service: Uuid, characteristic: Uuid, descriptor: Uuid) -> Self {
        Self::new(vec![GattService {
            uuid: service,
            characteristics: vec![GattCharacteristic {
                uuid: characteristic,
                properties: CharacteristicProperties {
                    write: true,
                    write_without_response: true,
                    notify: true,
                    indicate: false,
                },
                descriptors: vec![descriptor],
            }],
        }])
    }

    pub fn set_enabled(&self, enabled: bool) {
        lock(&self.state).enabled = enabled;
    }

    pub fn set_mtu(&self, mtu: usize) {
        lock(&self.state).mtu = mtu;
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.state).writes.clone()
    }

    /// Written values decoded as UTF-8.
    pub fn written_text(&self) -> Vec<String> {
        lock(&self.state)
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(&w.value).into_owned())
            .collect()
    }

    /// `(target, descriptor)` pairs notifications were enabled on.
    pub fn notifications(&self) -> Vec<(GattTarget, Uuid)> {
        lock(&self.state).notifications.clone()
    }

    pub fn disconnects(&self) -> u32 {
        lock(&self.state).disconnects
    }

    /// Simulates the peripheral going out of range.
    pub fn drop_link(&self, reason: &str) {
        let link = lock(&self.state).link.take();
        if let Some(link) = link {
            link.lost(reason);
        }
    }
}

#[async_trait]
impl BleCentral for MockBleCentral {
    fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    async fn connect(&self, _device: &RemoteDevice, link: LinkMonitor) -> Result<Box<dyn GattSession>, LinkError> {
        let mut state = lock(&self.state);
        if !state.enabled {
            return Err(LinkError::AdapterUnavailable("mock central disabled".to_string()));
        }
        state.link = Some(link);
        Ok(Box::new(MockGattLink {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MockGattLink {
    state: Arc<Mutex<CentralState>>,
    open: bool,
}

#[async_trait]
impl GattSession for MockGattLink {
    async fn discover_services(&mut self) -> Result<Vec<GattService>, LinkError> {
        Ok(lock(&self.state).services.clone())
    }

    async fn enable_notifications(&mut self, target: GattTarget, descriptor: Uuid) -> Result<(), LinkError> {
        lock(&self.state).notifications.push((target, descriptor));
        Ok(())
    }

    async fn write(&mut self, target: GattTarget, value: &[u8], kind: WriteKind) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotConnected);
        }
        lock(&self.state).writes.push(RecordedWrite {
            target,
            value: value.to_vec(),
            kind,
        });
        Ok(())
    }

    fn mtu(&self) -> usize {
        lock(&self.state).mtu
    }

    async fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            let mut state = lock(&self.state);
            state.disconnects += 1;
            state.link = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_mock_adapter_pairs_local_and_remote_ends() {
        // Arrange
        let adapter = MockBluetoothAdapter::new();
        let mut local = adapter
            .connect_rfcomm(&RemoteDevice::new("00:00:00:00:00:01"), Uuid::nil())
            .await
            .unwrap();

        // Act
        local.write_all(b"ping\n").await.unwrap();
        drop(local);

        // Assert
        let mut remote = adapter.take_peer().unwrap();
        let mut received = String::new();
        remote.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "ping\n");
        assert_eq!(adapter.attempts(), 1);
    }

    #[tokio::test]
    async fn test_mock_central_records_writes_and_disconnects() {
        let service = Uuid::from_u128(1);
        let characteristic = Uuid::from_u128(2);
        let central = MockBleCentral::with_writable_characteristic(service, characteristic, Uuid::from_u128(3));
        let (link, _losses) = LinkMonitor::channel(1);
        let mut session = central
            .connect(&RemoteDevice::new("00:00:00:00:00:02"), link)
            .await
            .unwrap();
        let target = GattTarget { service, characteristic };

        session.write(target, b"a,1", WriteKind::WithoutResponse).await.unwrap();
        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(central.written_text(), vec!["a,1".to_string()]);
        assert_eq!(central.disconnects(), 1);
        assert!(session.write(target, b"late", WriteKind::WithoutResponse).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_central_drop_link_reports_loss() {
        let central = MockBleCentral::new(Vec::new());
        let (link, mut losses) = LinkMonitor::channel(9);
        let _session = central
            .connect(&RemoteDevice::new("00:00:00:00:00:03"), link)
            .await
            .unwrap();

        central.drop_link("out of range");

        let loss = losses.recv().await.unwrap();
        assert_eq!(loss.epoch, 9);
        assert_eq!(loss.reason, "out of range");
    }
}
