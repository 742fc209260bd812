// src/storage/blocking.rs
//! Sink adapter for encoders running on the async runtime
//!
//! Storage writers use blocking `std::fs` calls, including an fsync on
//! close. On a multi-threaded runtime every call is wrapped in
//! [`tokio::task::block_in_place`] so the worker hands its other tasks to
//! another thread while the call blocks. Elsewhere the call runs inline.

use crate::storage::StorageWriter;
use crate::utils::errors::Result;
use std::io::{self, Write};
use tokio::runtime::{Handle, RuntimeFlavor};

fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// [`StorageWriter`] that keeps its blocking calls off the runtime workers
pub struct BlockingSink {
    inner: Box<dyn StorageWriter>,
}

impl BlockingSink {
    pub fn new(inner: Box<dyn StorageWriter>) -> Self {
        Self { inner }
    }
}

impl Write for BlockingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        run_blocking(|| self.inner.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        run_blocking(|| self.inner.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        run_blocking(|| self.inner.flush())
    }
}

impl StorageWriter for BlockingSink {
    fn set_metadata(&mut self, start_time: i64, ip: &str, country: &str, username: Option<&str>) {
        run_blocking(|| self.inner.set_metadata(start_time, ip, country, username))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let inner = self.inner;
        run_blocking(move || inner.close())
    }
}
