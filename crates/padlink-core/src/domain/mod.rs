//! Domain entities for padlink.
//!
//! This module contains pure value types with no infrastructure dependencies.
//!
//! # What lives here?
//!
//! - [`event`] – the typed events a control pad produces.
//! - [`transport`] – immutable per-transport configuration objects, stored as
//!   JSON by the settings screen and validated when a connection is built.
//! - [`connection`] – the persisted connection row, the transport
//!   discriminant, and the transport-qualified connection state machine.
//!
//! Code in outer layers (the connection engine, the CLI) depends on these
//! types, but nothing in here opens a socket or spawns a task.  That keeps
//! every rule in this module testable without a network.

pub mod connection;
pub mod event;
pub mod transport;
