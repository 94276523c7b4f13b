//! Raw TCP client transport.
//!
//! Each event is written as one UTF-8 line terminated by `\n`.  `TCP_NODELAY`
//! is set so small event lines leave immediately instead of waiting for
//! Nagle's algorithm to batch them.
//!
//! The configured timeout covers only the connect phase.  A refused connect
//! is retried every [`REFUSED_RETRY_INTERVAL`] inside that window because the
//! receiver may still be starting; once the window closes the worker reports
//! `TCP_CONNECTION_TIMEOUT`.  Name resolution failures and any other socket
//! error end the attempt at once as `TCP_CONNECTION_FAILED`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use padlink_core::{TcpConfig, TransportKind};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::framing::{spawn_eof_watch, write_line};
use super::{LinkError, LinkMonitor, Transport};

/// Delay between attempts while the receiver refuses connections.
pub const REFUSED_RETRY_INTERVAL: Duration = Duration::from_millis(250);

pub struct TcpTransport {
    config: Arc<TcpConfig>,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config: Arc::new(config),
            writer: None,
            reader: None,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn connect_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_secs))
    }

    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError> {
        let host = self.config.host.as_str();
        let port = self.config.port;

        let stream = loop {
            match TcpStream::connect((host, port)).await {
                Ok(stream) => break stream,
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!(host, port, "connection refused; retrying");
                    tokio::time::sleep(REFUSED_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(LinkError::Failed(format!("{host}:{port}: {e}"))),
            }
        };
        stream.set_nodelay(true)?;

        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        self.reader = Some(spawn_eof_watch(read_half, link, "TCP"));
        self.writer = Some(write_half);

        info!(%peer, "TCP connection established");
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
            let _ = writer.shutdown().await;
        }
    }
}
