//! Bluetooth classic (RFCOMM) transport.
//!
//! The radio is reached through the [`BluetoothAdapter`] trait so the engine
//! never depends on a platform Bluetooth stack.  Platform glue implements the
//! trait; [`NoBluetoothAdapter`] is the disabled default and
//! [`MockBluetoothAdapter`](super::mock::MockBluetoothAdapter) backs the
//! integration tests with in-memory byte streams.
//!
//! Connecting requires an enabled adapter, a configured remote device and a
//! bond with that device.  Any of those missing ends the attempt as
//! `BLUETOOTH_CONNECTION_FAILED`.  The connect phase is bounded by
//! [`BLUETOOTH_CONNECT_TIMEOUT`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use padlink_core::{BluetoothConfig, RemoteDevice, TransportKind};
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use super::framing::{spawn_eof_watch, write_line};
use super::{LinkError, LinkMonitor, Transport};

/// Fixed connect-phase timeout for RFCOMM.
pub const BLUETOOTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// A bidirectional byte stream, such as an RFCOMM socket.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// An open RFCOMM channel.
pub type RfcommStream = Box<dyn ByteStream>;

/// Platform access to the classic Bluetooth radio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// `false` when the radio is missing or switched off.
    fn is_enabled(&self) -> bool;

    /// Devices the user has paired with.
    fn bonded_devices(&self) -> Vec<RemoteDevice>;

    /// Opens an RFCOMM channel to `service` on `device`.
    async fn connect_rfcomm(&self, device: &RemoteDevice, service: Uuid) -> io::Result<RfcommStream>;
}

/// Adapter for hosts without Bluetooth support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBluetoothAdapter;

#[async_trait]
impl BluetoothAdapter for NoBluetoothAdapter {
    fn is_enabled(&self) -> bool {
        false
    }

    fn bonded_devices(&self) -> Vec<RemoteDevice> {
        Vec::new()
    }

    async fn connect_rfcomm(&self, _device: &RemoteDevice, _service: Uuid) -> io::Result<RfcommStream> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Bluetooth is not available on this host",
        ))
    }
}

pub struct BluetoothTransport {
    config: Arc<BluetoothConfig>,
    adapter: Arc<dyn BluetoothAdapter>,
    writer: Option<WriteHalf<RfcommStream>>,
    reader: Option<JoinHandle<()>>,
}

impl BluetoothTransport {
    pub fn new(config: BluetoothConfig, adapter: Arc<dyn BluetoothAdapter>) -> Self {
        Self {
            config: Arc::new(config),
            adapter,
            writer: None,
            reader: None,
        }
    }
}

#[async_trait]
impl Transport for BluetoothTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Bluetooth
    }

    fn connect_timeout(&self) -> Option<Duration> {
        Some(BLUETOOTH_CONNECT_TIMEOUT)
    }

    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError> {
        if !self.adapter.is_enabled() {
            return Err(LinkError::AdapterUnavailable(
                "Bluetooth adapter is disabled".to_string(),
            ));
        }
        let config = Arc::clone(&self.config);
        let device = config
            .remote_device
            .as_ref()
            .ok_or_else(|| LinkError::Failed("no remote device configured".to_string()))?;
        if !self
            .adapter
            .bonded_devices()
            .iter()
            .any(|bonded| bonded.same_address(device))
        {
            return Err(LinkError::Failed(format!(
                "device {} is not bonded",
                device.address
            )));
        }

        let stream = self
            .adapter
            .connect_rfcomm(device, config.service_uuid)
            .await
            .map_err(|e| LinkError::Failed(format!("RFCOMM connect to {}: {e}", device.address)))?;

        let (read_half, write_half) = tokio::io::split(stream);
        self.reader = Some(spawn_eof_watch(read_half, link, "RFCOMM"));
        self.writer = Some(write_half);

        info!(device = %device.address, service = %config.service_uuid, "RFCOMM channel open");
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::NotConnected)?;
        write_line(writer, data)
            .await
            .map_err(|e| LinkError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut writer).await;
        }
    }
}
