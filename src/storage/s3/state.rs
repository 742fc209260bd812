// src/storage/s3/state.rs
//! Upload state machine
//!
//! Each tracked audit log moves through
//!
//! ```text
//! Streaming → Finishing → Finalizing → Done
//!      └──────────┴───────────┴──────→ Aborted
//! ```
//!
//! The transition decisions are pure functions of the entry's progress so
//! they can be tested without a bucket.

use crate::storage::s3::client::CompletedPart;

/// Consecutive failures after which an audit log is given up
pub const MAX_FAILURES: u32 = 20;

/// Consecutive failures after which an audit log is given up during shutdown
pub const MAX_FAILURES_ON_SHUTDOWN: u32 = 3;

/// Phase of a tracked audit log, derived from its progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Still being written
    Streaming,
    /// Writing finished, bytes remain to be uploaded
    Finishing,
    /// Everything uploaded, multipart upload not yet completed
    Finalizing,
}

impl UploadPhase {
    pub fn of(finished: bool, uploaded: u64, size: u64) -> Self {
        match (finished, uploaded >= size) {
            (false, _) => UploadPhase::Streaming,
            (true, false) => UploadPhase::Finishing,
            (true, true) => UploadPhase::Finalizing,
        }
    }
}

/// What the upload task should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    /// Drop a finished file that never received any bytes
    Discard,
    /// Upload the whole finished file as one object
    SingleShot,
    /// Upload `[start, end)` as multipart part `part_number`
    UploadPart { part_number: i32, start: u64, end: u64 },
    /// Complete the multipart upload and drop the local file
    Finalize,
    /// Not enough new data for a part
    Wait,
}

/// Decide the next step for an entry
///
/// Part numbers are 1-based and follow from the uploaded byte count, so a
/// part is never uploaded twice. The last part of a finished file absorbs
/// any remainder smaller than `part_size`. An empty finished file is never
/// uploaded.
pub fn next_step(finished: bool, uploaded: u64, size: u64, part_size: u64) -> UploadStep {
    let remaining = size.saturating_sub(uploaded);

    if finished && size == 0 {
        return UploadStep::Discard;
    }
    if finished && uploaded == 0 {
        return UploadStep::SingleShot;
    }
    if (finished && remaining > 0) || remaining >= part_size {
        let start = uploaded;
        let mut end = size.min(start + part_size);
        if finished && size - end < part_size {
            end = size;
        }
        let part_number = i32::try_from(uploaded / part_size + 1).unwrap_or(i32::MAX);
        return UploadStep::UploadPart {
            part_number,
            start,
            end,
        };
    }
    if finished {
        return UploadStep::Finalize;
    }
    UploadStep::Wait
}

/// Whether an entry with `failures` consecutive failures is abandoned
pub fn should_abandon(failures: u32, shutting_down: bool, deadline_expired: bool) -> bool {
    failures > MAX_FAILURES
        || (shutting_down && failures > MAX_FAILURES_ON_SHUTDOWN)
        || (deadline_expired && failures > 0)
}

/// Progress of one entry, owned by its upload task
#[derive(Debug, Default, Clone)]
pub struct UploadProgress {
    pub uploaded: u64,
    pub upload_id: Option<String>,
    pub parts: Vec<CompletedPart>,
    pub failures: u32,
}

impl UploadProgress {
    pub fn record_part(&mut self, part_number: i32, etag: String, bytes: u64) {
        self.uploaded += bytes;
        self.parts.push(CompletedPart { part_number, etag });
        self.failures = 0;
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Forget the multipart upload so the next step starts over from byte 0
    ///
    /// Returns the id of the upload that was dropped. The failure count is
    /// kept.
    pub fn restart(&mut self) -> Option<String> {
        self.uploaded = 0;
        self.parts.clear();
        self.upload_id.take()
    }
}
