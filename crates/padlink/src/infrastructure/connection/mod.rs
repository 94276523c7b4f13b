//! The connection engine: one state machine driving any of five transports.
//!
//! A [`Connection`] is a cheap handle.  The real work happens on a dedicated
//! OS thread that runs a single-threaded tokio runtime and owns the boxed
//! [`Transport`].  Every I/O task of the connection (connect, read loops, the
//! WebSocket accept loop, the MQTT event loop, writes and close) runs on that
//! thread and nowhere else.
//!
//! ```text
//! caller threads                      worker thread
//! ──────────────                      ─────────────
//! setup()      ─┐                     ┌─► Transport::connect  (timeout, cancellable)
//! send_data()  ─┼─► command channel ──┼─► Transport::send
//! tear_down()  ─┘   (unbounded, FIFO) └─► Transport::close
//!                                        ▲
//!                    LinkMonitor::lost ──┘  background reader / event loop
//! ```
//!
//! # State machine
//!
//! ```text
//! NONE ─► CONNECTING ─► CONNECTED ─► DISCONNECTING ─► DISCONNECTED
//!              │             └──────(link lost)──────────►┘
//!              ├─► CONNECTION_FAILED  ─► DISCONNECTING
//!              ├─► CONNECTION_TIMEOUT ─► DISCONNECTING
//!              └─► DISCONNECTING (torn down mid-connect)
//! ```
//!
//! Failures never cross the public API as errors or panics; they surface as
//! states on the [`StateStream`] and as a failed [`Delivery`].
//!
//! # Cancellation
//!
//! Each `setup()` is stamped with an increasing epoch.  `tear_down()` raises a
//! `watch` cancel mark to the latest issued epoch, which aborts an in-flight
//! connect immediately instead of waiting behind it in the queue.  A teardown
//! only cancels setups issued before it.
//!
//! The same mark bounds writes: once a teardown is requested, a write the
//! transport has not accepted within [`WRITE_CANCEL_GRACE`] is abandoned and
//! the channel is closed, so a receiver that stops reading cannot hold the
//! worker.  Messages still queued behind it fail as [`SendError::Cancelled`].

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use padlink_core::{ConnectionPhase, ConnectionState, ConnectionType, TransportKind};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub mod ble;
pub mod bluetooth;
mod framing;
pub mod mock;
pub mod mqtt;
pub mod state;
pub mod tcp;
pub mod websocket;

pub use state::{StateCell, StateStream};

/// How long an in-flight write may keep running after a teardown request.
pub const WRITE_CANCEL_GRACE: Duration = Duration::from_millis(250);

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised by a [`Transport`] inside the worker.
///
/// These never reach callers directly: the worker maps them to states.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The channel could not be established.
    #[error("connect failed: {0}")]
    Failed(String),

    /// The transport gave up waiting for the channel.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The radio is missing or switched off.
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// A write was attempted with no established channel.
    #[error("not connected")]
    NotConnected,

    /// Writing to an established channel failed.
    #[error("write failed: {0}")]
    Write(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a [`Delivery`] failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection was not in a `*_CONNECTED` state; nothing was written.
    #[error("connection is not established")]
    NotConnected,

    /// The transport failed to write; the connection is now disconnected.
    #[error("transport error: {0}")]
    Transport(String),

    /// A teardown abandoned the message before the transport accepted it.
    #[error("write abandoned by teardown")]
    Cancelled,

    /// The worker exited before handling the message.
    #[error("connection worker has stopped")]
    WorkerStopped,
}

// ── Delivery ──────────────────────────────────────────────────────────────────

/// Pass/fail outcome of one `send_data` call.
///
/// Dropping it is fine; the message is still written.
#[must_use = "drop the Delivery explicitly if the outcome does not matter"]
pub struct Delivery {
    rx: oneshot::Receiver<Result<(), SendError>>,
}

impl Delivery {
    /// Waits until the worker has written (or refused) the message.
    pub async fn outcome(self) -> Result<(), SendError> {
        self.rx.await.unwrap_or(Err(SendError::WorkerStopped))
    }
}

// ── Link monitoring ───────────────────────────────────────────────────────────

/// A background notification that an established channel has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLoss {
    /// Setup epoch of the channel that was lost.
    pub epoch: u64,
    pub reason: String,
}

/// Handed to [`Transport::connect`] so background tasks can report link loss.
///
/// Reports are stamped with the setup epoch; the worker ignores reports from
/// a channel that has since been replaced.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    epoch: u64,
    tx: mpsc::UnboundedSender<LinkLoss>,
}

impl LinkMonitor {
    /// Creates a monitor plus the receiving end, for driving a transport
    /// outside a [`Connection`].
    pub fn channel(epoch: u64) -> (Self, mpsc::UnboundedReceiver<LinkLoss>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { epoch, tx }, rx)
    }

    /// Reports that the channel ended.  Safe to call more than once.
    pub fn lost(&self, reason: impl Into<String>) {
        let _ = self.tx.send(LinkLoss {
            epoch: self.epoch,
            reason: reason.into(),
        });
    }
}

// ── Transport seam ────────────────────────────────────────────────────────────

/// One concrete channel (TCP, WebSocket, RFCOMM, GATT, MQTT).
///
/// Implementations only move bytes.  State, timeouts, cancellation and
/// ordering are handled by the worker that owns the transport.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Upper bound for [`connect`](Self::connect); `None` waits until torn
    /// down.
    fn connect_timeout(&self) -> Option<Duration>;

    /// Establishes the channel.  May be dropped mid-way on timeout or
    /// teardown, after which [`close`](Self::close) is called.
    async fn connect(&mut self, link: LinkMonitor) -> Result<(), LinkError>;

    /// Writes one encoded event.
    async fn send(&mut self, data: &str) -> Result<(), LinkError>;

    /// Releases every resource.  Must be idempotent.
    async fn close(&mut self);
}

// ── Connection handle ─────────────────────────────────────────────────────────

enum Command {
    Setup {
        epoch: u64,
    },
    Send {
        data: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    TearDown,
}

/// A live connection of one [`ConnectionType`].
///
/// All methods return immediately; outcomes are observed through
/// [`subscribe`](Self::subscribe) and [`Delivery`].
pub struct Connection {
    connection_type: ConnectionType,
    state: StateCell,
    commands: mpsc::UnboundedSender<Command>,
    cancel: watch::Sender<u64>,
    last_epoch: AtomicU64,
    finished: Option<oneshot::Receiver<()>>,
}

impl Connection {
    /// Starts the worker thread for `transport`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the runtime or the thread cannot be created.
    pub fn spawn(connection_type: ConnectionType, transport: Box<dyn Transport>) -> io::Result<Self> {
        let state = StateCell::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(0);
        let (finished_tx, finished) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker = Worker {
            kind: transport.kind(),
            transport,
            state: state.clone(),
            cancel: cancel_rx,
            active_epoch: 0,
            write_abandoned: false,
        };

        thread::Builder::new()
            .name(format!("padlink-{}", connection_type.as_str().to_ascii_lowercase()))
            .spawn(move || {
                runtime.block_on(worker.run(command_rx));
                // Dropping the runtime aborts leftover tasks and closes their sockets.
                drop(runtime);
                let _ = finished_tx.send(());
            })?;

        Ok(Self {
            connection_type,
            state,
            commands,
            cancel,
            last_epoch: AtomicU64::new(0),
            finished: Some(finished),
        })
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Returns a stream of the current state followed by every transition.
    pub fn subscribe(&self) -> StateStream {
        self.state.subscribe()
    }

    /// Starts establishing the channel.
    ///
    /// Ignored with a warning unless the connection is in `NONE` or
    /// `*_DISCONNECTED` when the worker gets to it.
    pub fn setup(&self) {
        let epoch = self.last_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(transport = %self.connection_type, epoch, "setup requested");
        let _ = self.commands.send(Command::Setup { epoch });
    }

    /// Queues one message for the channel.
    pub fn send_data(&self, data: impl Into<String>) -> Delivery {
        let (reply, rx) = oneshot::channel();
        // On failure the command (and its reply sender) is dropped, which
        // resolves the Delivery as WorkerStopped.
        let _ = self.commands.send(Command::Send {
            data: data.into(),
            reply,
        });
        Delivery { rx }
    }

    /// Releases the channel and any listener.  Idempotent.
    pub fn tear_down(&self) {
        let epoch = self.last_epoch.load(Ordering::SeqCst);
        self.cancel.send_modify(|mark| *mark = (*mark).max(epoch));
        debug!(transport = %self.connection_type, epoch, "teardown requested");
        let _ = self.commands.send(Command::TearDown);
    }

    /// Tears down and waits until the worker has released every resource.
    pub async fn shutdown(mut self) {
        self.tear_down();
        let finished = self.finished.take();
        drop(self);
        if let Some(finished) = finished {
            let _ = finished.await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.send_modify(|mark| *mark = u64::MAX);
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker {
    kind: TransportKind,
    transport: Box<dyn Transport>,
    state: StateCell,
    cancel: watch::Receiver<u64>,
    /// Epoch of the most recent setup that reached `CONNECTING`.
    active_epoch: u64,
    /// Set when a teardown cut a write short; cleared by the next setup.
    write_abandoned: bool,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (link_tx, mut losses) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Setup { epoch }) => self.setup(epoch, &link_tx).await,
                    Some(Command::Send { data, reply }) => self.send(data, reply).await,
                    Some(Command::TearDown) => self.tear_down().await,
                    None => break,
                },
                Some(loss) = losses.recv() => self.link_lost(loss).await,
            }
        }

        self.transport.close().await;
        debug!(transport = %self.kind, "connection worker stopped");
    }

    fn enter(&self, phase: ConnectionPhase) {
        self.state.transition(ConnectionState::of(self.kind, phase));
    }

    async fn setup(&mut self, epoch: u64, link_tx: &mpsc::UnboundedSender<LinkLoss>) {
        let current = self.state.current();
        if !current.accepts_setup() {
            warn!(transport = %self.kind, state = %current, "setup ignored; connection already set up");
            return;
        }
        if *self.cancel.borrow() >= epoch {
            debug!(transport = %self.kind, epoch, "setup cancelled before it started");
            return;
        }

        self.active_epoch = epoch;
        self.write_abandoned = false;
        self.enter(ConnectionPhase::Connecting);

        let link = LinkMonitor {
            epoch,
            tx: link_tx.clone(),
        };
        let limit = self.transport.connect_timeout();
        let mut cancel = self.cancel.clone();

        let outcome = {
            let transport = &mut self.transport;
            let connect = async move {
                match limit {
                    Some(limit) => tokio::time::timeout(limit, transport.connect(link))
                        .await
                        .unwrap_or(Err(LinkError::Timeout(limit))),
                    None => transport.connect(link).await,
                }
            };
            tokio::select! {
                result = connect => Some(result),
                _ = async {
                    let _ = cancel.wait_for(|mark| *mark >= epoch).await;
                } => None,
            }
        };

        match outcome {
            Some(Ok(())) => self.enter(ConnectionPhase::Connected),
            Some(Err(LinkError::Timeout(after))) => {
                warn!(transport = %self.kind, epoch, ?after, "connect timed out");
                self.transport.close().await;
                self.enter(ConnectionPhase::ConnectionTimeout);
            }
            Some(Err(e)) => {
                warn!(transport = %self.kind, epoch, error = %e, "connect failed");
                self.transport.close().await;
                self.enter(ConnectionPhase::ConnectionFailed);
            }
            None => {
                info!(transport = %self.kind, epoch, "connect cancelled by teardown");
                self.transport.close().await;
            }
        }
    }

    async fn send(&mut self, data: String, reply: oneshot::Sender<Result<(), SendError>>) {
        if !self.state.current().is_connected() {
            debug!(transport = %self.kind, bytes = data.len(), "dropping message; not connected");
            let _ = reply.send(Err(SendError::NotConnected));
            return;
        }

        if self.write_abandoned {
            let _ = reply.send(Err(SendError::Cancelled));
            return;
        }

        let epoch = self.active_epoch;
        let mut cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            result = self.transport.send(&data) => Some(result),
            _ = async {
                let _ = cancel.wait_for(|mark| *mark >= epoch).await;
                tokio::time::sleep(WRITE_CANCEL_GRACE).await;
            } => None,
        };

        match outcome {
            Some(Ok(())) => {
                let _ = reply.send(Ok(()));
            }
            Some(Err(e)) => {
                warn!(transport = %self.kind, error = %e, "write failed; dropping connection");
                let _ = reply.send(Err(SendError::Transport(e.to_string())));
                self.transport.close().await;
                self.enter(ConnectionPhase::Disconnected);
            }
            None => {
                warn!(transport = %self.kind, epoch, bytes = data.len(), "write stalled past teardown; abandoning");
                let _ = reply.send(Err(SendError::Cancelled));
                self.write_abandoned = true;
                self.transport.close().await;
            }
        }
    }

    async fn tear_down(&mut self) {
        match self.state.current().phase() {
            None | Some(ConnectionPhase::Disconnected) => {
                debug!(transport = %self.kind, "teardown with nothing to release");
                self.transport.close().await;
            }
            Some(_) => {
                self.enter(ConnectionPhase::Disconnecting);
                self.transport.close().await;
                self.enter(ConnectionPhase::Disconnected);
            }
        }
    }

    async fn link_lost(&mut self, loss: LinkLoss) {
        if loss.epoch != self.active_epoch || !self.state.current().is_connected() {
            debug!(transport = %self.kind, epoch = loss.epoch, reason = %loss.reason, "ignoring stale link loss");
            return;
        }
        warn!(transport = %self.kind, epoch = loss.epoch, reason = %loss.reason, "link lost");
        self.transport.close().await;
        self.enter(ConnectionPhase::Disconnected);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
