// src/message/mod.rs
//! Audit log event model
//!
//! Events are the unit of the audit log. Each carries the connection it
//! belongs to, a nanosecond timestamp, a numeric type code, an optional
//! channel id and a payload whose shape is fixed by the type.

pub mod event;
pub mod payload;

pub use event::{now_nanos, ChannelId, ConnectionId, Event, EventRecord, EventType};
pub use payload::*;
