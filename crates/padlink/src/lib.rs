//! # padlink
//!
//! The connection engine behind a padlink control pad, plus a terminal
//! session controller (`padlink` binary) that drives it from stdin.
//!
//! # Architecture overview (for beginners)
//!
//! The crate follows the same three layers as the rest of the workspace:
//!
//! - **`domain`** – The TOML session profile read by the binary.
//!
//! - **`application`** – Use-cases: the [`ConnectionFactory`] that turns a
//!   stored `(connectionType, configJson)` pair into a live connection, and the
//!   [`PlaySession`] that owns one connection for the lifetime of a play
//!   screen and feeds it encoded events.
//!
//! - **`infrastructure`** – The [`Connection`] handle, its state machine and
//!   worker thread, and the five transports (TCP, WebSocket, Bluetooth
//!   classic, Bluetooth LE, MQTT).  Radio hardware is reached only through the
//!   `BluetoothAdapter` and `BleCentral` traits; in-memory mocks live in
//!   `infrastructure::connection::mock`.
//!
//! ```text
//! UI / stdin ──► Event ──► EventEncoder ──► Connection::send_data
//!                                               │ (command channel)
//!                                               ▼
//!                                  worker thread (current-thread runtime)
//!                                               │
//!                                    Box<dyn Transport>::send ──► wire
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::factory::{ConnectionFactory, FactoryError};
pub use application::session::{PlaySession, SessionStats};
pub use infrastructure::connection::{Connection, Delivery, LinkError, SendError, StateStream};
