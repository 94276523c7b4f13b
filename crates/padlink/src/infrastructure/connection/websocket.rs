//! WebSocket transports: an outbound client and an embedded single-peer
//! server.
//!
//! Both send one text frame per event.
//!
//! # Client
//!
//! Connects to a `ws://` or `wss://` URL.  Like TCP, a refused connection is
//! retried inside the configured timeout.  A Close frame or stream error from
//! the peer is reported as link loss.
//!
//! # Server
//!
//! Binds `127.0.0.1:port` (or `0.0.0.0:port`) and reaches `WEBSOCKET_CONNECTED`
//! once the first peer completes the handshake.  Events always go to the most
//! recently connected peer: when a second peer connects it becomes the send
//! target, and the older peer stays open but receives nothing further.  Only
//! the tracked peer's disconnect counts as link loss.
//!
//! ```text
//! accept loop ──► handshake task (peer 1) ──► tracked ──► reader
//!             └─► handshake task (peer 2) ──► tracked ──► reader   (peer 1 untracked)
//! ```
//!
//! Teardown stops the accept loop and every peer task, which releases the port
//! and closes every peer socket.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use padlink_core::{TransportKind, WebSocketClientConfig, WebSocketServerConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::tcp::REFUSED_RETRY_INTERVAL;
use super::{LinkError, LinkMonitor, Transport};

/// Upper bound for the closing handshake during teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Reads frames until the peer goes away.  Returns a description of why.
async fn drain_until_closed<S>(mut stream: SplitStream<WebSocketStream<S>>) -> String
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Close(frame)) => {
                return match frame {
                    Some(frame) => format!("peer sent Close ({}: {})", frame.code, frame.reason),
                    None => "peer sent Close".to_string(),
                };
            }
            Ok(other) => debug!(len = other.len(), "ignoring inbound WebSocket frame"),
            Err(e) => return format!("WebSocket read failed: {e}"),
        }
    }
    "WebSocket stream ended".to_string()
}

// ── Client ────────────────────────────────────────────────────────────────────

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketClientTransport {
    config: Arc<WebSocketClientConfig>,
    sink: Option<SplitSink<ClientStream, WsMessage>>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketClientTransport {
    pub fn new(config: WebSocketClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            sink: None,
            reader: None,
        }
    }
}

#[async_trait]
impl Transport for WebSocketClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn connect_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_secs))
    }

    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError> {
        let url = self.config.url.as_str();

        let ws = loop {
            match connect_async(url).await {
                Ok((ws, _response)) => break ws,
                Err(WsError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    debug!(url, "WebSocket connection refused; retrying");
                    tokio::time::sleep(REFUSED_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(LinkError::Failed(format!("{url}: {e}"))),
            }
        };

        let (sink, stream) = ws.split();
        self.reader = Some(tokio::spawn(async move {
            let reason = drain_until_closed(stream).await;
            link.lost(reason);
        }));
        self.sink = Some(sink);

        info!(url, "WebSocket client connected");
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), LinkError> {
        let sink = self.sink.as_mut().ok_or(LinkError::NotConnected)?;
        sink.send(WsMessage::Text(data.to_string()))
            .await
            .map_err(|e| LinkError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

struct TrackedPeer {
    id: u64,
    addr: SocketAddr,
    sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
}

/// State shared between the accept loop, the peer tasks and the transport.
struct PeerSlot {
    next_id: AtomicU64,
    /// The send target.  Replaced whenever a newer peer finishes its handshake.
    current: tokio::sync::Mutex<Option<TrackedPeer>>,
    /// Completed when the first peer becomes tracked.
    first_peer: Mutex<Option<oneshot::Sender<()>>>,
    /// Handshake/reader task of every peer, tracked or not.
    peer_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerSlot {
    fn new(first_peer: oneshot::Sender<()>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            current: tokio::sync::Mutex::new(None),
            first_peer: Mutex::new(Some(first_peer)),
            peer_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Records a peer task, forgetting peers that have already gone.
    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.peer_tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}

pub struct WebSocketServerTransport {
    config: Arc<WebSocketServerConfig>,
    slot: Option<Arc<PeerSlot>>,
    acceptor: Option<JoinHandle<()>>,
}

impl WebSocketServerTransport {
    pub fn new(config: WebSocketServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            slot: None,
            acceptor: None,
        }
    }

    fn bind_addr(&self) -> SocketAddr {
        let ip = if self.config.listen_on_all_interfaces {
            Ipv4Addr::UNSPECIFIED
        } else {
            Ipv4Addr::LOCALHOST
        };
        SocketAddr::from((ip, self.config.port))
    }
}

#[async_trait]
impl Transport for WebSocketServerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn connect_timeout(&self) -> Option<Duration> {
        self.config.accept_timeout_secs.map(Duration::from_secs)
    }

    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LinkError::Failed(format!("failed to bind WebSocket server on {addr}: {e}")))?;
        info!(%addr, "WebSocket server listening; waiting for a peer");

        let (first_tx, first_rx) = oneshot::channel();
        let slot = Arc::new(PeerSlot::new(first_tx));
        self.slot = Some(Arc::clone(&slot));
        self.acceptor = Some(tokio::spawn(accept_loop(listener, slot, link)));

        first_rx
            .await
            .map_err(|_| LinkError::Failed("WebSocket accept loop stopped".to_string()))
    }

    async fn send(&mut self, data: &str) -> Result<(), LinkError> {
        let slot = self.slot.as_ref().ok_or(LinkError::NotConnected)?;
        let mut current = slot.current.lock().await;
        let peer = current.as_mut().ok_or(LinkError::NotConnected)?;
        peer.sink
            .send(WsMessage::Text(data.to_string()))
            .await
            .map_err(|e| LinkError::Write(format!("peer {}: {e}", peer.addr)))
    }

    async fn close(&mut self) {
        // Waiting on the aborted acceptor guarantees the listener is dropped
        // before close returns, so the port can be bound again immediately.
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            let _ = acceptor.await;
        }

        let Some(slot) = self.slot.take() else {
            return;
        };
        if let Some(mut peer) = slot.current.lock().await.take() {
            let _ = tokio::time::timeout(CLOSE_GRACE, peer.sink.close()).await;
        }
        let tasks: Vec<_> = slot
            .peer_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

async fn accept_loop(listener: TcpListener, slot: Arc<PeerSlot>, link: LinkMonitor) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "incoming WebSocket connection");
                let task = tokio::spawn(serve_peer(stream, addr, Arc::clone(&slot), link.clone()));
                slot.track(task);
            }
            Err(e) => {
                // Transient (e.g. too many open files); keep listening.
                error!("WebSocket accept error: {e}");
                tokio::time::sleep(REFUSED_RETRY_INTERVAL).await;
            }
        }
    }
}

async fn serve_peer(stream: TcpStream, addr: SocketAddr, slot: Arc<PeerSlot>, link: LinkMonitor) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %addr, "WebSocket handshake failed: {e}");
            return;
        }
    };

    let id = slot.next_id.fetch_add(1, Ordering::SeqCst);
    let (sink, stream) = ws.split();
    let replaced = slot
        .current
        .lock()
        .await
        .replace(TrackedPeer { id, addr, sink });
    match replaced {
        Some(old) => info!(peer = %addr, previous = %old.addr, "newer WebSocket peer replaces previous send target"),
        None => info!(peer = %addr, "WebSocket peer connected"),
    }
    // The old peer's sink is dropped here; its reader keeps the socket open.

    let first_peer = slot
        .first_peer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(first_peer) = first_peer {
        let _ = first_peer.send(());
    }

    let reason = drain_until_closed(stream).await;
    let mut current = slot.current.lock().await;
    if current.as_ref().map(|peer| peer.id) == Some(id) {
        current.take();
        drop(current);
        link.lost(format!("peer {addr}: {reason}"));
    } else {
        debug!(peer = %addr, %reason, "untracked WebSocket peer went away");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
