//! Networking layer for tierkv.
//!
//! Provides:
//! - `TcpTransport`: implements `Transport` over TCP for real network I/O
//! - `ReplicaServer`: in-memory replica speaking the same protocol
//! - `protocol`: line-delimited JSON framing shared by both sides

pub mod protocol;
pub mod server;
pub mod tcp;

pub use server::{MemStore, ReplicaServer};
pub use tcp::TcpTransport;
