// src/codes.rs
//! Stable message codes attached to upload queue log lines
//!
//! Operators grep for these, so their values must not change.

/// Starting a new multipart upload
pub const M_MULTIPART_UPLOAD: &str = "AUDIT_S3_MULTIPART_UPLOAD";

/// Creating a multipart upload failed; check credentials and permissions
pub const E_MULTIPART_UPLOAD_INITIALIZATION_FAILED: &str =
    "AUDIT_S3_MULTIPART_UPLOAD_INITIALIZATION_FAILED";

/// Uploading one part of an audit log
pub const M_MULTIPART_PART_UPLOADING: &str = "AUDIT_S3_MULTIPART_PART_UPLOADING";

/// A part upload failed
pub const E_MULTIPART_PART_UPLOAD_FAILED: &str = "AUDIT_S3_MULTIPART_PART_UPLOAD_FAILED";

/// A part upload completed
pub const M_MULTIPART_PART_UPLOAD_COMPLETE: &str = "AUDIT_S3_MULTIPART_PART_UPLOAD_COMPLETE";

/// All parts are uploaded, completing the multipart upload
pub const M_MULTIPART_UPLOAD_FINALIZING: &str = "AUDIT_S3_MULTIPART_UPLOAD_FINALIZING";

/// Completing the multipart upload failed
pub const E_MULTIPART_UPLOAD_FINALIZATION_FAILED: &str =
    "AUDIT_S3_MULTIPART_UPLOAD_FINALIZATION_FAILED";

/// The multipart upload was completed
pub const M_MULTIPART_UPLOAD_FINALIZED: &str = "AUDIT_S3_MULTIPART_UPLOAD_FINALIZED";

/// Aborting a multipart upload left over from a previous run failed
pub const E_MULTIPART_FAILED_ABORT: &str = "AUDIT_S3_MULTIPART_FAILED_ABORT";

/// Listing in-progress multipart uploads failed
pub const E_MULTIPART_FAILED_LIST: &str = "AUDIT_S3_MULTIPART_FAILED_LIST";

/// Uploading a whole audit log in one request
pub const M_SINGLE_UPLOAD: &str = "AUDIT_S3_SINGLE_UPLOAD";

/// The single upload failed
pub const E_SINGLE_UPLOAD_FAILED: &str = "AUDIT_S3_SINGLE_UPLOAD_FAILED";

/// The single upload completed
pub const M_SINGLE_UPLOAD_COMPLETE: &str = "AUDIT_S3_SINGLE_UPLOAD_COMPLETE";

/// Writing the local metadata sidecar failed
pub const E_FAILED_WRITING_METADATA_FILE: &str = "AUDIT_S3_FAILED_WRITING_METADATA_FILE";

/// Reading the local metadata sidecar failed
pub const E_FAILED_READING_METADATA_FILE: &str = "AUDIT_S3_FAILED_READING_METADATA_FILE";

/// Stat of a queued audit log failed
pub const E_FAILED_QUEUE_STAT: &str = "AUDIT_S3_FAILED_STAT_QUEUE_ENTRY";

/// Removing an uploaded audit log from the local directory failed
pub const E_REMOVE_AUDIT_LOG_FAILED: &str = "AUDIT_S3_REMOVE_FAILED";

/// Giving up on an audit log and aborting its multipart upload
pub const E_MULTIPART_ABORTING: &str = "AUDIT_S3_MULTIPART_ABORTING";

/// The bucket rejected a multipart upload, which is started over
pub const E_MULTIPART_UPLOAD_RESTARTING: &str = "AUDIT_S3_MULTIPART_UPLOAD_RESTARTING";

/// Dropping an audit log that was closed without any content
pub const M_EMPTY_AUDIT_LOG_DISCARDED: &str = "AUDIT_S3_EMPTY_DISCARDED";

/// Re-uploading an audit log found on disk at startup
pub const M_RECOVERING: &str = "AUDIT_S3_RECOVERING";

/// Closing the audit log storage failed
pub const E_AUDIT_LOG_STORAGE_CLOSE_FAILED: &str = "AUDIT_STORAGE_CLOSE_FAILED";

/// Encoding an audit log failed
pub const E_AUDIT_LOG_ENCODE_FAILED: &str = "AUDIT_ENCODE_FAILED";
