//! Infrastructure layer: sockets, radio adapters and the connection worker.

pub mod connection;
