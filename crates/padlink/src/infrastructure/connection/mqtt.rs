//! MQTT publisher transport, protocol v3.1.1 (`MQTT_V3`) or v5 (`MQTT_V5`).
//!
//! Built on `rumqttc`.  Its event loop has to be polled for anything to
//! happen on the wire, so connect spawns a poller task that:
//!
//! - reports the CONNACK outcome back to `connect`, and
//! - keeps polling afterwards so queued PUBLISH packets are flushed, turning
//!   any later event-loop error into link loss.
//!
//! Every event is published at QoS 0 with retain off.  There is no automatic
//! reconnect: once the event loop fails the connection is disconnected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use padlink_core::{MqttConfig, TransportKind};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::{LinkError, LinkMonitor, Transport};

/// Fixed connect-phase timeout, covering TCP connect and CONNACK.
pub const MQTT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive interval sent in CONNECT.
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Upper bound for flushing DISCONNECT during teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// MQTT protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttVersion {
    V3,
    V5,
}

enum MqttClient {
    V3(rumqttc::AsyncClient),
    V5(rumqttc::v5::AsyncClient),
}

type ConnAckResult = Result<(), String>;

pub struct MqttTransport {
    config: Arc<MqttConfig>,
    version: MqttVersion,
    client: Option<MqttClient>,
    poller: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn new(config: MqttConfig, version: MqttVersion) -> Self {
        Self {
            config: Arc::new(config),
            version,
            client: None,
            poller: None,
        }
    }

    pub fn version(&self) -> MqttVersion {
        self.version
    }

    fn client_id(&self) -> String {
        self.config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("padlink-{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mqtt
    }

    fn connect_timeout(&self) -> Option<Duration> {
        Some(MQTT_CONNECT_TIMEOUT)
    }

    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError> {
        let (host, port) = self
            .config
            .broker_address()
            .map_err(|e| LinkError::Failed(e.to_string()))?;
        let client_id = self.client_id();
        let (ready_tx, ready_rx) = oneshot::channel();

        debug!(%host, port, %client_id, version = ?self.version, "connecting to MQTT broker");

        match self.version {
            MqttVersion::V3 => {
                let mut options = rumqttc::MqttOptions::new(client_id, host, port);
                options.set_keep_alive(KEEP_ALIVE).set_clean_session(true);
                if let Some(credentials) = &self.config.credentials {
                    options.set_credentials(credentials.username.clone(), credentials.password.clone());
                }
                let (client, event_loop) = rumqttc::AsyncClient::new(options, REQUEST_CAPACITY);
                self.client = Some(MqttClient::V3(client));
                self.poller = Some(tokio::spawn(poll_v3(event_loop, ready_tx, link)));
            }
            MqttVersion::V5 => {
                let mut options = rumqttc::v5::MqttOptions::new(client_id, host, port);
                options.set_keep_alive(KEEP_ALIVE).set_clean_start(true);
                if let Some(credentials) = &self.config.credentials {
                    options.set_credentials(credentials.username.clone(), credentials.password.clone());
                }
                let (client, event_loop) = rumqttc::v5::AsyncClient::new(options, REQUEST_CAPACITY);
                self.client = Some(MqttClient::V5(client));
                self.poller = Some(tokio::spawn(poll_v5(event_loop, ready_tx, link)));
            }
        }

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(broker = %self.config.broker, topic = %self.config.topic, "MQTT session established");
                Ok(())
            }
            Ok(Err(reason)) => Err(LinkError::Failed(reason)),
            Err(_) => Err(LinkError::Failed("MQTT event loop stopped".to_string())),
        }
    }

    async fn send(&mut self, data: &str) -> Result<(), LinkError> {
        let topic = self.config.topic.as_str();
        let payload = data.as_bytes().to_vec();
        match self.client.as_ref().ok_or(LinkError::NotConnected)? {
            MqttClient::V3(client) => client
                .publish(topic, rumqttc::QoS::AtMostOnce, false, payload)
                .await
                .map_err(|e| LinkError::Write(e.to_string())),
            MqttClient::V5(client) => client
                .publish(topic, rumqttc::v5::mqttbytes::QoS::AtMostOnce, false, payload)
                .await
                .map_err(|e| LinkError::Write(e.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            // DISCONNECT is only queued here; the poller flushes it, then stops
            // once the dropped client closes the request channel.
            let _ = tokio::time::timeout(CLOSE_GRACE, async {
                match client {
                    MqttClient::V3(client) => client.disconnect().await.is_ok(),
                    MqttClient::V5(client) => client.disconnect().await.is_ok(),
                }
            })
            .await;
        }
        if let Some(mut poller) = self.poller.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut poller).await.is_err() {
                poller.abort();
                let _ = poller.await;
            }
        }
    }
}

/// Reports the first outcome on `ready`; afterwards errors become link loss.
fn report(ready: &mut Option<oneshot::Sender<ConnAckResult>>, link: &LinkMonitor, outcome: ConnAckResult) {
    match (ready.take(), outcome) {
        (Some(ready), outcome) => {
            let _ = ready.send(outcome);
        }
        (None, Err(reason)) => link.lost(reason),
        (None, Ok(())) => {}
    }
}

async fn poll_v3(mut event_loop: rumqttc::EventLoop, ready: oneshot::Sender<ConnAckResult>, link: LinkMonitor) {
    use rumqttc::{ConnectReturnCode, Event, Packet};

    let mut ready = Some(ready);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    report(&mut ready, &link, Ok(()));
                } else {
                    report(&mut ready, &link, Err(format!("broker refused connection: {:?}", ack.code)));
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                report(&mut ready, &link, Err(format!("MQTT event loop error: {e}")));
                return;
            }
        }
    }
}

async fn poll_v5(mut event_loop: rumqttc::v5::EventLoop, ready: oneshot::Sender<ConnAckResult>, link: LinkMonitor) {
    use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
    use rumqttc::v5::Event;

    let mut ready = Some(ready);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    report(&mut ready, &link, Ok(()));
                } else {
                    report(&mut ready, &link, Err(format!("broker refused connection: {:?}", ack.code)));
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                report(&mut ready, &link, Err(format!("MQTT event loop error: {e}")));
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_generated_client_id_has_prefix() {
        let transport = MqttTransport::new(MqttConfig::new("localhost", "pad"), MqttVersion::V3);
        let id = transport.client_id();
        assert!(id.starts_with("padlink-"));
        assert_eq!(id.len(), "padlink-".len() + 36);
    }

    #[test]
    fn test_configured_client_id_is_used() {
        let mut config = MqttConfig::new("localhost", "pad");
        config.client_id = Some("living-room-pad".to_string());
        let transport = MqttTransport::new(config, MqttVersion::V5);
        assert_eq!(transport.client_id(), "living-room-pad");
    }

    #[tokio::test]
    async fn test_send_before_connect_is_not_connected() {
        let mut transport = MqttTransport::new(MqttConfig::new("localhost", "pad"), MqttVersion::V3);
        assert!(matches!(transport.send("x").await, Err(LinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_broker_closing_before_connack_fails() {
        // Arrange – a "broker" that accepts the socket and hangs up at once
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });
        let mut transport = MqttTransport::new(
            MqttConfig::new(format!("tcp://127.0.0.1:{port}"), "pad/events"),
            MqttVersion::V3,
        );
        let (link, _losses) = LinkMonitor::channel(1);

        // Act
        let result = transport.connect(link).await;
        transport.close().await;

        // Assert
        assert!(matches!(result, Err(LinkError::Failed(_))));
    }

    #[test]
    fn test_report_routes_late_errors_to_link_loss() {
        let (link, mut losses) = LinkMonitor::channel(3);
        let (tx, mut rx) = oneshot::channel();
        let mut ready = Some(tx);

        report(&mut ready, &link, Ok(()));
        report(&mut ready, &link, Err("broker went away".to_string()));

        assert_eq!(rx.try_recv().unwrap(), Ok(()));
        let loss = losses.try_recv().unwrap();
        assert_eq!(loss.epoch, 3);
        assert_eq!(loss.reason, "broker went away");
    }
}
