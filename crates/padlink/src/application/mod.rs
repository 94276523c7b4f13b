//! Application layer: use-case orchestration.
//!
//! - [`factory`] – builds a [`Connection`](crate::Connection) from a stored
//!   connection type and config JSON.
//! - [`session`] – owns one connection for a play session and streams
//!   encoded events into it.

pub mod factory;
pub mod session;
