//! Spool data types shared by the daemon and external post-processors.
//!
//! A spool entry is one stored blob plus a sibling status marker. The
//! daemon only ever writes [`STATUS_RECEIVED`]; later states are written by
//! the post-processor and reported back verbatim. Status values are opaque
//! strings and are never validated.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Initial status written when a blob has been durably stored.
pub const STATUS_RECEIVED: &str = "received";
/// Post-processing has started.
pub const STATUS_PROCESSING: &str = "processing";
/// Post-processing finished successfully.
pub const STATUS_DONE: &str = "done";
/// Post-processing finished with an error.
pub const STATUS_FAILED: &str = "failed";

/// Length of a spool identifier (a lowercase hex SHA-1 digest).
pub const ID_LEN: usize = 40;

/// Returns true if `id` is a well-formed spool identifier.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Contents of the status marker stored next to each blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolMarker {
    pub status: String,
    pub fingerprint: Fingerprint,
    /// Unix timestamp (seconds) of the first successful receipt.
    pub received_at: i64,
}

/// Identifier and status of a spool entry, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolEntry {
    pub id: String,
    pub status: String,
}

/// Full view of a single spool entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolStatus {
    pub id: String,
    pub status: String,
    /// Missing only if the marker was lost after the blob was published.
    pub fingerprint: Option<Fingerprint>,
    pub received_at: Option<i64>,
}

/// Result of a successful ingestion.
///
/// Confirms durable receipt only. It makes no claim about post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub status: String,
    /// Path to poll for status, e.g. `/spool/<id>`.
    pub location: String,
    pub fingerprint: Fingerprint,
}
