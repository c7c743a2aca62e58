//! # blobproc
//!
//! Receive binary payloads over HTTP, fingerprint them, and keep them in a
//! content-addressed spool for later post-processing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────────┐
//! │   HTTP   │──▶│ Spool service │──▶│ <spool>/ab/ab…   │
//! │ (axum)   │   │ fingerprint   │   │ + status marker  │
//! └──────────┘   └──────┬────────┘   └──────────────────┘
//!                       │ optional
//!                       ▼
//!                ┌──────────────┐
//!                │ URL map      │
//!                │ (SQLite)     │
//!                └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. `POST /spool` reads the body within the configured deadline.
//! 2. The body is fingerprinted (size, MD5, SHA-1, SHA-256, media type).
//! 3. The bytes are stored under `<spool>/<sha1[0..2]>/<sha1>`, written to
//!    a temp file first and then published, and marked `received`.
//! 4. If the request carries the source URL header and a URL map is
//!    configured, `(url, sha1)` is recorded. Failures here are logged only.
//! 5. The response carries a `Location` header for status polling.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection |
//! | [`logging`] | Structured and access log setup |
//! | [`pdfinfo`] | External `pdfinfo` runner |
//! | [`server`] | HTTP server |
//! | [`spool`] | Content-addressed spool |
//! | [`urlmap`] | URL provenance map |

pub mod config;
pub mod db;
pub mod logging;
pub mod pdfinfo;
pub mod server;
pub mod spool;
pub mod urlmap;

pub use blobproc_core::{fingerprint, models};
