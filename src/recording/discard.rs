// src/recording/discard.rs
//! Encoder that consumes events without writing anything

use crate::message::{Event, EventType};
use crate::recording::Encoder;
use crate::storage::StorageWriter;
use crate::utils::errors::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Drains the event channel until it closes or the connection disconnects
///
/// The sink is dropped untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardEncoder;

impl DiscardEncoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Encoder for DiscardEncoder {
    async fn encode(
        &self,
        mut events: mpsc::Receiver<Event>,
        _sink: Box<dyn StorageWriter>,
    ) -> Result<()> {
        while let Some(event) = events.recv().await {
            if event.event_type == EventType::Disconnect {
                break;
            }
        }
        Ok(())
    }

    fn mime_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn file_extension(&self) -> &'static str {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ConnectionId;
    use crate::storage::{NoneStorage, WritableStorage};

    #[tokio::test]
    async fn test_stops_at_disconnect() {
        let (tx, rx) = mpsc::channel(4);
        let sink = NoneStorage::new().open_writer("x").unwrap();
        let task = tokio::spawn(async move { DiscardEncoder::new().encode(rx, sink).await });

        let disconnect = Event {
            connection_id: ConnectionId::new(vec![1]),
            timestamp: 1,
            event_type: EventType::Disconnect,
            payload: None,
            channel_id: None,
        };
        tx.send(disconnect).await.unwrap();
        assert!(task.await.unwrap().is_ok());
        // the receiver is gone once the encoder returned
        assert!(tx.is_closed());
    }
}
