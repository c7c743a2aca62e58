//! Content-addressed spool.
//!
//! Accepted payloads are stored under a path derived from their SHA-1
//! digest, sharded by the first two hex characters:
//!
//! ```text
//! <spool>/
//! ├── .tmp/                       in-flight writes, never listed
//! ├── a9/
//! │   ├── a9993e36…c9cd0d89d      blob bytes
//! │   └── a9993e36…c9cd0d89d.json status marker (SpoolMarker)
//! └── …
//! ```
//!
//! Writes go to `.tmp/` first and are published with a link into the final
//! location, so a partially written body is never visible under its
//! content-addressed name. Publishing is create-if-absent: concurrent
//! uploads of the same bytes race harmlessly and leave exactly one entry.
//!
//! The blob is always published before its marker. A failed blob write
//! therefore never leaves a marker behind.
//!
//! Temp files are removed when their write is abandoned, including when the
//! ingest future is dropped mid-write. Leftovers from a killed process are
//! swept by [`SpoolService::clean_tmp`] at startup.

use axum::body::Bytes;
use chrono::Utc;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use blobproc_core::fingerprint::Fingerprint;
use blobproc_core::models::{
    is_valid_id, Receipt, SpoolEntry, SpoolMarker, SpoolStatus, STATUS_RECEIVED,
};

use crate::urlmap::ProvenanceSink;

/// Status reported in a [`Receipt`]: the payload was durably stored.
pub const RECEIPT_ACCEPTED: &str = "accepted";

const TMP_DIR: &str = ".tmp";
const MARKER_EXT: &str = "json";
const TMP_SUFFIX: &str = ".partial";

/// Errors surfaced by the spool.
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    /// The request carried an empty body.
    #[error("no data")]
    NoData,
    /// The body could not be read in full (disconnect, timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// The body exceeded the configured size cap. Resending cannot succeed.
    #[error("payload exceeds {0} bytes")]
    TooLarge(usize),
    /// Writing or reading the spool directory failed.
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
    #[error("spool entry not found: {0}")]
    NotFound(String),
    #[error("invalid spool identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Ingests, lists and reports on spooled blobs.
///
/// Holds no mutable state of its own; the spool directory is the source
/// of truth, so a single instance is shared across all request tasks.
pub struct SpoolService {
    dir: PathBuf,
    provenance: Option<Arc<dyn ProvenanceSink>>,
}

impl SpoolService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            provenance: None,
        }
    }

    /// Record `(url, sha1)` pairs for payloads that carry a source URL.
    pub fn with_provenance(mut self, sink: Arc<dyn ProvenanceSink>) -> Self {
        self.provenance = Some(sink);
        self
    }

    /// Create the spool and temp directories if missing.
    pub async fn ensure_dirs(&self) -> Result<(), SpoolError> {
        tokio::fs::create_dir_all(self.dir.join(TMP_DIR)).await?;
        Ok(())
    }

    /// Remove temp files left behind by an earlier process. Call before
    /// serving; files of in-flight writes would be removed too.
    pub async fn clean_tmp(&self) -> Result<usize, SpoolError> {
        let mut entries = match tokio::fs::read_dir(self.dir.join(TMP_DIR)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "removed stale temp files");
        }
        Ok(removed)
    }

    /// Store `body` under its content address and mark it as received.
    ///
    /// Re-ingesting identical bytes is a no-op on disk and keeps whatever
    /// status the entry already has. A provenance failure is logged and
    /// does not fail the ingestion.
    ///
    /// # Errors
    ///
    /// - [`SpoolError::NoData`] for an empty body, before any I/O.
    /// - [`SpoolError::Storage`] if the blob or its marker cannot be written.
    pub async fn ingest(
        &self,
        body: Bytes,
        source_url: Option<&str>,
    ) -> Result<Receipt, SpoolError> {
        if body.is_empty() {
            return Err(SpoolError::NoData);
        }

        // Bytes clones share the buffer; the fingerprint sees the same bytes
        // that are written below.
        let data = body.clone();
        let fingerprint = tokio::task::spawn_blocking(move || Fingerprint::from_bytes(&data))
            .await
            .map_err(|e| SpoolError::Storage(io::Error::other(e)))?;
        let id = fingerprint.id().to_string();

        self.ensure_dirs().await?;

        let blob_path = self.blob_path(&id);
        if tokio::fs::try_exists(&blob_path).await? {
            debug!(id = %id, "blob already spooled");
        } else {
            let created = self.publish_new(&blob_path, &body).await?;
            debug!(id = %id, created, "published blob");
        }

        let marker = SpoolMarker {
            status: STATUS_RECEIVED.to_string(),
            fingerprint: fingerprint.clone(),
            received_at: Utc::now().timestamp(),
        };
        let marker_bytes = serde_json::to_vec(&marker).map_err(io::Error::other)?;
        self.publish_new(&self.marker_path(&id), &marker_bytes).await?;

        info!(
            id = %id,
            size = fingerprint.size,
            mimetype = %fingerprint.mimetype,
            "spooled blob"
        );

        if let (Some(sink), Some(url)) = (&self.provenance, source_url) {
            let url = url.trim();
            if !url.is_empty() {
                match sink.record(url, &id, Utc::now()).await {
                    Ok(()) => debug!(id = %id, url, "recorded provenance"),
                    Err(e) => warn!(id = %id, url, error = %e, "failed to record provenance"),
                }
            }
        }

        Ok(Receipt {
            location: format!("/spool/{}", id),
            id,
            status: RECEIPT_ACCEPTED.to_string(),
            fingerprint,
        })
    }

    /// Enumerate spool entries in filesystem order.
    ///
    /// The returned iterator is lazy and reads the directory as it goes;
    /// call `list` again to restart. Entries that disappear or cannot be
    /// read mid-walk are skipped. No lock is taken, so ingestion proceeds
    /// concurrently.
    pub fn list(&self) -> impl Iterator<Item = SpoolEntry> + Send + 'static {
        let root = self.dir.clone();
        WalkDir::new(root.clone())
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable spool entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| {
                let id = entry.file_name().to_str()?.to_string();
                if !is_valid_id(&id) {
                    return None;
                }
                let status = match read_marker_sync(&marker_path_in(&root, &id)) {
                    Ok(Some(marker)) => marker.status,
                    Ok(None) => STATUS_RECEIVED.to_string(),
                    Err(e) => {
                        warn!(id = %id, error = %e, "unreadable status marker");
                        return None;
                    }
                };
                Some(SpoolEntry { id, status })
            })
    }

    /// Report the current status of entry `id`.
    ///
    /// A blob whose marker is missing or undecodable is reported as
    /// `received` without a fingerprint, the same way [`list`](Self::list)
    /// reports it.
    pub async fn status(&self, id: &str) -> Result<SpoolStatus, SpoolError> {
        self.check_exists(id).await?;
        let marker = read_marker(&self.marker_path(id)).await?;
        Ok(match marker {
            Some(m) => SpoolStatus {
                id: id.to_string(),
                status: m.status,
                fingerprint: Some(m.fingerprint),
                received_at: Some(m.received_at),
            },
            None => SpoolStatus {
                id: id.to_string(),
                status: STATUS_RECEIVED.to_string(),
                fingerprint: None,
                received_at: None,
            },
        })
    }

    /// Replace the status of entry `id`.
    ///
    /// This is the hook for the external post-processor. The status string
    /// is stored verbatim. The marker is rewritten atomically, so readers
    /// see either the old or the new status.
    pub async fn update_status(&self, id: &str, status: &str) -> Result<(), SpoolError> {
        self.check_exists(id).await?;
        let marker_path = self.marker_path(id);

        let mut marker = match read_marker(&marker_path).await? {
            Some(m) => m,
            None => {
                let blob_path = self.blob_path(id);
                let fingerprint =
                    tokio::task::spawn_blocking(move || Fingerprint::from_file(&blob_path))
                        .await
                        .map_err(|e| SpoolError::Storage(io::Error::other(e)))??;
                SpoolMarker {
                    status: STATUS_RECEIVED.to_string(),
                    fingerprint,
                    received_at: Utc::now().timestamp(),
                }
            }
        };
        marker.status = status.to_string();

        let bytes = serde_json::to_vec(&marker).map_err(io::Error::other)?;
        self.ensure_dirs().await?;
        let tmp = self.write_tmp(&bytes).await?;
        tokio::fs::rename(&tmp, &marker_path).await?;
        // Renamed away; nothing left to remove.
        let _ = tmp.keep();
        info!(id = %id, status, "updated spool status");
        Ok(())
    }

    async fn check_exists(&self, id: &str) -> Result<(), SpoolError> {
        if !is_valid_id(id) {
            return Err(SpoolError::InvalidIdentifier(id.to_string()));
        }
        if !tokio::fs::try_exists(self.blob_path(id)).await? {
            return Err(SpoolError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Write `bytes` to a temp file, then link it into `dest` unless `dest`
    /// already exists. Returns whether this call created `dest`.
    async fn publish_new(&self, dest: &Path, bytes: &[u8]) -> Result<bool, SpoolError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.write_tmp(bytes).await?;
        let result = tokio::fs::hard_link(&tmp, dest).await;
        drop(tmp);
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `bytes` to a fresh file under `.tmp/`. The file is deleted
    /// when the returned path is dropped, on every exit path.
    async fn write_tmp(&self, bytes: &[u8]) -> Result<TempPath, SpoolError> {
        use tokio::io::AsyncWriteExt;

        let tmp_dir = self.dir.join(TMP_DIR);
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .suffix(TMP_SUFFIX)
                .tempfile_in(tmp_dir)
        })
        .await
        .map_err(|e| SpoolError::Storage(io::Error::other(e)))??;
        let (file, path) = named.into_parts();

        let mut file = tokio::fs::File::from_std(file);
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(path)
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        blob_path_in(&self.dir, id)
    }

    fn marker_path(&self, id: &str) -> PathBuf {
        marker_path_in(&self.dir, id)
    }
}

fn shard(id: &str) -> &str {
    id.get(0..2).unwrap_or("xx")
}

fn blob_path_in(root: &Path, id: &str) -> PathBuf {
    root.join(shard(id)).join(id)
}

fn marker_path_in(root: &Path, id: &str) -> PathBuf {
    root.join(shard(id)).join(format!("{}.{}", id, MARKER_EXT))
}

async fn read_marker(path: &Path) -> Result<Option<SpoolMarker>, SpoolError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(decode_marker(path, &bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_marker_sync(path: &Path) -> io::Result<Option<SpoolMarker>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(decode_marker(path, &bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// A marker that does not decode is treated as absent; `update_status`
/// rewrites it from the blob.
fn decode_marker(path: &Path, bytes: &[u8]) -> Option<SpoolMarker> {
    match serde_json::from_slice(bytes) {
        Ok(marker) => Some(marker),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring undecodable status marker");
            None
        }
    }
}
