//! # blobproc core
//!
//! Shared, runtime-free logic for blobproc: content fingerprinting,
//! the tolerant `pdfinfo` report parser, and the spool data types.
//!
//! This crate contains no tokio, sqlx, or network dependencies. Everything
//! here operates on already-buffered data and is bounded, CPU-only work.

pub mod fingerprint;
pub mod models;
pub mod pdfinfo;
