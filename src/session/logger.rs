// src/session/logger.rs
//! Top-level audit logger
//!
//! Opens one audit log per connection and runs one encoder task for it.
//! Encoders write through a [`BlockingSink`] so file writes and syncs never
//! stall a runtime worker.
//! Encoder failures never reach the SSH connection; they are logged,
//! counted and published on the logger's bounded error channel.

use crate::codes;
use crate::geoip::GeoIpLookup;
use crate::message::ConnectionId;
use crate::recording::{new_encoder, Encoder};
use crate::session::connection::{Connection, ConnectionShared};
use crate::storage::{
    new_storage, new_storage_with_client, s3::BucketClient, BlockingSink, StorageWriter,
    WritableStorage,
};
use crate::utils::config::{AuditConfig, InterceptConfig};
use crate::utils::errors::{AuditError, Result};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Events a connection may hand over before its calls start waiting on the encoder
const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Encoder failures kept for the error receiver; later ones are only logged
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Audit logger shared by all connections of a server
pub struct AuditLogger {
    intercept: InterceptConfig,
    encoder: Arc<dyn Encoder>,
    storage: Arc<dyn WritableStorage>,
    geoip: Arc<dyn GeoIpLookup>,
    tracker: TaskTracker,
    errors: mpsc::Sender<AuditError>,
    error_receiver: Mutex<Option<mpsc::Receiver<AuditError>>>,
}

impl AuditLogger {
    pub fn new(
        intercept: InterceptConfig,
        encoder: Arc<dyn Encoder>,
        storage: Arc<dyn WritableStorage>,
        geoip: Arc<dyn GeoIpLookup>,
    ) -> Self {
        let (errors, error_receiver) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            intercept,
            encoder,
            storage,
            geoip,
            tracker: TaskTracker::new(),
            errors,
            error_receiver: Mutex::new(Some(error_receiver)),
        }
    }

    /// Build the encoder and storage selected in `config`
    pub async fn from_config(config: &AuditConfig, geoip: Arc<dyn GeoIpLookup>) -> Result<Self> {
        config.validate()?;
        let storage = new_storage(config).await?;
        Ok(Self::from_parts(config, storage, geoip))
    }

    /// Like [`AuditLogger::from_config`], uploading through `client` when
    /// object storage is selected
    pub fn with_bucket_client(
        config: &AuditConfig,
        client: Arc<dyn BucketClient>,
        geoip: Arc<dyn GeoIpLookup>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = new_storage_with_client(config, client)?;
        Ok(Self::from_parts(config, storage, geoip))
    }

    fn from_parts(
        config: &AuditConfig,
        storage: Arc<dyn WritableStorage>,
        geoip: Arc<dyn GeoIpLookup>,
    ) -> Self {
        let encoder = new_encoder(config.format, geoip.clone());
        info!(
            format = ?config.format,
            storage = ?config.storage,
            "Audit logger initialized"
        );
        Self::new(config.intercept, encoder, storage, geoip)
    }

    /// Receiver of encoder failures, available once
    ///
    /// Holds at most 64 unread failures; failures beyond that are dropped.
    pub fn take_error_receiver(&self) -> Option<mpsc::Receiver<AuditError>> {
        self.error_receiver.lock().take()
    }

    /// Number of connections whose audit log is still being written
    pub fn active_connections(&self) -> usize {
        self.tracker.len()
    }

    /// Start the audit log of a new connection and record the connect
    ///
    /// The audit log is named after the hex form of `connection_id`, which
    /// must therefore be unique.
    pub async fn on_connect(&self, connection_id: ConnectionId, remote: SocketAddr) -> Result<Connection> {
        if self.tracker.is_closed() {
            return Err(AuditError::Storage("audit logger is shutting down".to_string()));
        }
        let name = connection_id.hex();
        let writer = self.storage.open_writer(&name)?;
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let encoder = self.encoder.clone();
        let errors = self.errors.clone();
        let writer: Box<dyn StorageWriter> = Box::new(BlockingSink::new(writer));
        self.tracker.spawn(async move {
            match encoder.encode(receiver, writer).await {
                Ok(()) => debug!(name = %name, "Audit log written"),
                Err(e) => {
                    error!(
                        code = codes::E_AUDIT_LOG_ENCODE_FAILED,
                        name = %name,
                        error = %e,
                        "Failed to write audit log"
                    );
                    metrics::counter!("sshaudit_encode_failures_total").increment(1);
                    publish_error(&errors, e);
                }
            }
        });

        let ip = remote.ip();
        let connection = Connection::new(
            ConnectionShared {
                connection_id,
                sender,
                intercept: self.intercept,
            },
            ip,
        );
        connection.on_connect(self.geoip.lookup(ip)).await;
        Ok(connection)
    }

    /// Wait for all audit logs to be written, then shut down the storage
    ///
    /// Cancelling `deadline` stops waiting for connections still being
    /// written and makes the storage give up on failing uploads.
    pub async fn shutdown(&self, deadline: CancellationToken) {
        self.tracker.close();
        tokio::select! {
            _ = self.tracker.wait() => {}
            _ = deadline.cancelled() => {
                warn!(
                    pending = self.tracker.len(),
                    "Shutdown deadline reached before all audit logs were written"
                );
            }
        }
        self.storage.shutdown(deadline).await;
        info!("Audit logger shut down");
    }
}

fn publish_error(errors: &mpsc::Sender<AuditError>, err: AuditError) {
    match errors.try_send(err) {
        Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(err)) => {
            debug!(error = %err, "Error channel full, dropping encoder failure");
            metrics::counter!("sshaudit_dropped_errors_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::StaticGeoIp;
    use crate::message::{EventType, Payload};
    use crate::recording::decoder::BinaryDecoder;
    use crate::recording::{collect, Decoder};
    use crate::storage::{FileStorage, NoneStorage};
    use crate::utils::config::{FileConfig, Format, StorageKind};
    use tempfile::tempdir;

    fn file_logger(dir: &std::path::Path, format: Format) -> AuditLogger {
        let config = AuditConfig {
            format,
            storage: StorageKind::File,
            intercept: InterceptConfig::all(),
            file: FileConfig {
                directory: dir.to_path_buf(),
            },
            ..Default::default()
        };
        let geoip = StaticGeoIp::new().with_entry("127.0.0.1".parse().unwrap(), "ZZ");
        AuditLogger::from_parts(
            &config,
            Arc::new(FileStorage::new(&config.file).unwrap()),
            Arc::new(geoip),
        )
    }

    #[tokio::test]
    async fn test_connect_disconnect_round_trip() {
        let dir = tempdir().unwrap();
        let logger = file_logger(dir.path(), Format::Binary);

        let id = ConnectionId::new(vec![0xde, 0xad]);
        let conn = logger
            .on_connect(id.clone(), "127.0.0.1:2222".parse().unwrap())
            .await
            .unwrap();
        conn.on_disconnect().await;
        logger.shutdown(CancellationToken::new()).await;

        let file = std::fs::File::open(dir.path().join("dead")).unwrap();
        let (events, errors) = BinaryDecoder::new().decode(Box::new(file));
        let (events, errors) = collect(events, errors).await;
        assert!(errors.is_empty());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].connection_id, id);
        match &events[0].payload {
            Some(Payload::Connect(p)) => {
                assert_eq!(p.remote_addr, "127.0.0.1");
                assert_eq!(p.country, "ZZ");
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(events[1].event_type, EventType::Disconnect);
    }

    #[tokio::test]
    async fn test_connect_refused_after_shutdown() {
        let dir = tempdir().unwrap();
        let logger = file_logger(dir.path(), Format::None);
        let conn = logger
            .on_connect(ConnectionId::new(vec![1]), "127.0.0.1:1".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(logger.active_connections(), 1);
        conn.on_disconnect().await;
        logger.shutdown(CancellationToken::new()).await;
        assert_eq!(logger.active_connections(), 0);

        let refused = logger
            .on_connect(ConnectionId::new(vec![2]), "127.0.0.1:1".parse().unwrap())
            .await;
        assert!(refused.is_err());
    }

    struct FailingStorage;

    struct FailingWriter;

    impl std::io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl StorageWriter for FailingWriter {
        fn set_metadata(&mut self, _: i64, _: &str, _: &str, _: Option<&str>) {}

        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl WritableStorage for FailingStorage {
        fn open_writer(&self, _name: &str) -> Result<Box<dyn StorageWriter>> {
            Ok(Box::new(FailingWriter))
        }

        async fn shutdown(&self, _deadline: CancellationToken) {}
    }

    #[tokio::test]
    async fn test_encode_failure_reaches_error_channel() {
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(StaticGeoIp::new());
        let logger = AuditLogger::new(
            InterceptConfig::default(),
            new_encoder(Format::Binary, geoip.clone()),
            Arc::new(FailingStorage),
            geoip,
        );
        let mut errors = logger.take_error_receiver().unwrap();
        assert!(logger.take_error_receiver().is_none());

        let conn = logger
            .on_connect(ConnectionId::new(vec![9]), "127.0.0.1:22".parse().unwrap())
            .await
            .unwrap();
        conn.on_auth_password("foo", b"bar").await;
        conn.on_disconnect().await;
        logger.shutdown(CancellationToken::new()).await;

        assert!(matches!(errors.recv().await, Some(AuditError::Encode(_) | AuditError::Io(_))));
    }

    #[tokio::test]
    async fn test_error_channel_is_bounded() {
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(StaticGeoIp::new());
        let logger = AuditLogger::new(
            InterceptConfig::default(),
            new_encoder(Format::Binary, geoip.clone()),
            Arc::new(FailingStorage),
            geoip,
        );

        for i in 0..(ERROR_CHANNEL_CAPACITY + 16) {
            let conn = logger
                .on_connect(ConnectionId::new(vec![i as u8, 1]), "127.0.0.1:22".parse().unwrap())
                .await
                .unwrap();
            conn.on_disconnect().await;
        }
        logger.shutdown(CancellationToken::new()).await;

        let mut errors = logger.take_error_receiver().unwrap();
        let mut received = 0;
        while errors.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, ERROR_CHANNEL_CAPACITY);
    }

    struct SlowStorage {
        ticks: Arc<std::sync::atomic::AtomicUsize>,
        ticks_during_writes: Arc<std::sync::atomic::AtomicUsize>,
    }

    struct SlowWriter {
        ticks: Arc<std::sync::atomic::AtomicUsize>,
        ticks_during_writes: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl std::io::Write for SlowWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            use std::sync::atomic::Ordering;
            let before = self.ticks.load(Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            let during = self.ticks.load(Ordering::SeqCst) - before;
            self.ticks_during_writes.fetch_add(during, Ordering::SeqCst);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl StorageWriter for SlowWriter {
        fn set_metadata(&mut self, _: i64, _: &str, _: &str, _: Option<&str>) {}

        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl WritableStorage for SlowStorage {
        fn open_writer(&self, _name: &str) -> Result<Box<dyn StorageWriter>> {
            Ok(Box::new(SlowWriter {
                ticks: self.ticks.clone(),
                ticks_during_writes: self.ticks_during_writes.clone(),
            }))
        }

        async fn shutdown(&self, _deadline: CancellationToken) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_storage_does_not_stall_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        while ticks.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let ticks_during_writes = Arc::new(AtomicUsize::new(0));
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(StaticGeoIp::new());
        let logger = AuditLogger::new(
            InterceptConfig::default(),
            new_encoder(Format::Binary, geoip.clone()),
            Arc::new(SlowStorage {
                ticks: ticks.clone(),
                ticks_during_writes: ticks_during_writes.clone(),
            }),
            geoip,
        );
        let conn = logger
            .on_connect(ConnectionId::new(vec![5]), "127.0.0.1:22".parse().unwrap())
            .await
            .unwrap();
        conn.on_disconnect().await;
        logger.shutdown(CancellationToken::new()).await;
        ticker.abort();

        assert!(ticks_during_writes.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_none_storage_accepts_connections() {
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(StaticGeoIp::new());
        let logger = AuditLogger::new(
            InterceptConfig::all(),
            new_encoder(Format::Asciinema, geoip.clone()),
            Arc::new(NoneStorage::new()),
            geoip,
        );
        let conn = logger
            .on_connect(ConnectionId::new(vec![3]), "[::1]:22".parse().unwrap())
            .await
            .unwrap();
        let channel = conn.on_new_channel_success("session").await;
        channel.on_request_shell(0).await;
        channel.on_exit(0).await;
        drop(channel);
        conn.on_disconnect().await;
        logger.shutdown(CancellationToken::new()).await;
    }
}
