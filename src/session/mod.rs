// src/session/mod.rs
//! Connection and channel dispatch
//!
//! The SSH server reports lifecycle callbacks to an [`AuditLogger`]. Each
//! connection gets its own bounded event channel and encoder task:
//!
//! ```text
//! AuditLogger::on_connect ─→ Connection ─on_*─┐
//!                                │            ├─→ mpsc ─→ Encoder ─→ StorageWriter
//!                                └─→ Channel ─┘
//!                                      └─→ stdin/stdout/stderr proxies
//! ```

pub mod channel;
pub mod connection;
pub mod logger;
pub mod proxy;

pub use channel::Channel;
pub use connection::Connection;
pub use logger::AuditLogger;
pub use proxy::{InterceptReader, InterceptWriter};
