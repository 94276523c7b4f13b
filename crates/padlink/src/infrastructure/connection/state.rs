//! The observable current-state cell of a connection.
//!
//! A [`StateCell`] holds exactly one [`ConnectionState`].  Observers call
//! [`StateCell::subscribe`] and receive the latest state immediately, then
//! every later transition in the order it was raised.  Late subscribers do
//! not see history, only the current value.
//!
//! # How replay-latest works
//!
//! The latest value sits behind a `Mutex` and every transition is published on
//! a `tokio::sync::broadcast` channel *while the mutex is held*.  Subscribing
//! takes the same lock, copies the current value and creates the broadcast
//! receiver in one step, so a subscriber can neither miss a transition nor see
//! one twice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use padlink_core::ConnectionState;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

/// Transitions buffered per subscriber before the oldest are dropped.
const STATE_BUFFER: usize = 64;

struct Inner {
    current: Mutex<ConnectionState>,
    tx: broadcast::Sender<ConnectionState>,
}

/// Shared, thread-safe holder of a connection's current state.
///
/// Cloning is cheap; all clones refer to the same cell.
#[derive(Clone)]
pub struct StateCell {
    inner: Arc<Inner>,
}

impl StateCell {
    /// Creates a cell in [`ConnectionState::None`].
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATE_BUFFER);
        Self {
            inner: Arc::new(Inner {
                current: Mutex::new(ConnectionState::None),
                tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        // The guarded value is a Copy enum; a panic elsewhere cannot leave it
        // half-written.
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current state.
    pub fn current(&self) -> ConnectionState {
        *self.lock()
    }

    /// Returns a stream that yields the current state, then every transition.
    pub fn subscribe(&self) -> StateStream {
        let guard = self.lock();
        StateStream {
            pending: Some(*guard),
            rx: self.inner.tx.subscribe(),
        }
    }

    /// Moves the cell to `next` and notifies subscribers.
    ///
    /// Returns `false` and leaves the state unchanged when the state machine
    /// does not allow the move.  That is a programming error in the caller, so
    /// debug builds panic.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut guard = self.lock();
        let previous = *guard;

        if !previous.can_transition_to(&next) {
            error!(from = %previous, to = %next, "rejected illegal connection state transition");
            debug_assert!(false, "illegal connection state transition {previous} -> {next}");
            return false;
        }

        *guard = next;
        // No receivers is fine: nobody is watching yet.
        let _ = self.inner.tx.send(next);
        drop(guard);

        info!(from = %previous, state = %next, "connection state changed");
        true
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered stream of connection states.
///
/// Yields `None` once the connection and its worker are both gone.
pub struct StateStream {
    pending: Option<ConnectionState>,
    rx: broadcast::Receiver<ConnectionState>,
}

impl StateStream {
    /// Waits for the next state.
    pub async fn next(&mut self) -> Option<ConnectionState> {
        if let Some(state) = self.pending.take() {
            return Some(state);
        }
        loop {
            match self.rx.recv().await {
                Ok(state) => return Some(state),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "state observer lagged; oldest transitions dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Waits until a state satisfying `predicate` arrives and returns it.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> Option<ConnectionState> {
        while let Some(state) = self.next().await {
            if predicate(&state) {
                return Some(state);
            }
        }
        None
    }

    /// Returns the next state if one is already available, without waiting.
    pub fn try_next(&mut self) -> Option<ConnectionState> {
        if let Some(state) = self.pending.take() {
            return Some(state);
        }
        loop {
            match self.rx.try_recv() {
                Ok(state) => return Some(state),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "state observer lagged; oldest transitions dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
