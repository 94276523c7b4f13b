//! The play-session controller.
//!
//! A [`PlaySession`] lives exactly as long as a play screen: it owns one
//! [`Connection`], turns every control event into text with the session's
//! [`EventEncoder`], and shuts the connection down when the screen closes.
//!
//! Encoding failures (an empty id, or a comma in an id under CSV) are counted
//! and logged but never end the session.

use padlink_core::{ConnectionState, ConnectionType, DataFormat, Event, EventEncoder};
use tracing::{info, warn};

use crate::infrastructure::connection::{Connection, Delivery, StateStream};

/// Counters reported when a session finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Events encoded and handed to the connection.
    pub events_sent: u64,
    /// Events dropped because they could not be encoded.
    pub encode_failures: u64,
}

pub struct PlaySession {
    connection: Connection,
    encoder: EventEncoder,
    stats: SessionStats,
}

impl PlaySession {
    pub fn new(connection: Connection, format: DataFormat) -> Self {
        Self {
            connection,
            encoder: EventEncoder::new(format),
            stats: SessionStats::default(),
        }
    }

    /// Starts connecting.  Progress is reported on [`states`](Self::states).
    pub fn start(&self) {
        info!(
            transport = %self.connection.connection_type(),
            format = ?self.encoder.format(),
            "starting play session"
        );
        self.connection.setup();
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection.connection_type()
    }

    pub fn format(&self) -> DataFormat {
        self.encoder.format()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn states(&self) -> StateStream {
        self.connection.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Encodes `event` and queues it on the connection.
    ///
    /// Returns `None` when the event could not be encoded.
    pub fn publish(&mut self, event: &Event) -> Option<Delivery> {
        match self.encoder.encode(event) {
            Ok(text) => {
                self.stats.events_sent += 1;
                Some(self.connection.send_data(text))
            }
            Err(e) => {
                self.stats.encode_failures += 1;
                warn!(id = %event.id, error = %e, "dropping event that cannot be encoded");
                None
            }
        }
    }

    /// Tears the connection down, waits for it to release every resource and
    /// returns the session counters.
    pub async fn finish(self) -> SessionStats {
        let stats = self.stats;
        self.connection.shutdown().await;
        info!(
            events_sent = stats.events_sent,
            encode_failures = stats.encode_failures,
            "play session finished"
        );
        stats
    }
}
