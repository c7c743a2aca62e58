//! Content fingerprinting for spooled blobs.
//!
//! A [`Fingerprint`] groups the byte size, three lowercase hex digests
//! (MD5, SHA-1, SHA-256) and a best-effort media type guess for a payload.
//! It is a pure function of the input bytes: identical payloads always
//! produce identical fingerprints, which makes the fingerprint the dedup
//! and addressing key of the spool.
//!
//! The SHA-1 digest is the primary digest. It names the spool entry and
//! is the value recorded in the provenance map.
//!
//! # Example
//!
//! ```rust
//! use blobproc_core::fingerprint::Fingerprint;
//!
//! let fp = Fingerprint::from_bytes(b"%PDF-1.5\n...");
//! assert_eq!(fp.mimetype, "application/pdf");
//! assert_eq!(fp.id(), fp.sha1_hex);
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Media type reported when no known signature matches.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Media type reported for payloads that look like UTF-8 text.
pub const TEXT_MEDIA_TYPE: &str = "text/plain; charset=utf-8";

/// Number of leading bytes inspected by the media type sniffer.
const SNIFF_LEN: usize = 3072;

/// Size, digests and media type of a payload.
///
/// All digests are computed over the exact bytes passed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    #[serde(rename = "md5hex")]
    pub md5_hex: String,
    #[serde(rename = "sha1hex")]
    pub sha1_hex: String,
    #[serde(rename = "sha256hex")]
    pub sha256_hex: String,
    pub mimetype: String,
}

impl Fingerprint {
    /// Fingerprint an in-memory payload.
    ///
    /// Every digest and the media type sniff read the same slice, so there
    /// is no way to observe a torn view of the content. An empty slice is
    /// valid input and yields the canonical empty-string digests.
    pub fn from_bytes(p: &[u8]) -> Self {
        Self {
            size: p.len() as u64,
            md5_hex: hex::encode(Md5::digest(p)),
            sha1_hex: hex::encode(Sha1::digest(p)),
            sha256_hex: hex::encode(Sha256::digest(p)),
            mimetype: sniff_media_type(p).to_string(),
        }
    }

    /// Buffer a reader to the end, then fingerprint the buffered bytes.
    pub fn from_reader<R: Read>(mut r: R) -> io::Result<Self> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(Self::from_bytes(&buf))
    }

    /// Fingerprint the contents of a file.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// The spool identifier derived from this fingerprint (the SHA-1 digest).
    pub fn id(&self) -> &str {
        &self.sha1_hex
    }
}

struct Signature {
    offset: usize,
    magic: &'static [u8],
    media_type: &'static str,
}

const fn sig(offset: usize, magic: &'static [u8], media_type: &'static str) -> Signature {
    Signature {
        offset,
        magic,
        media_type,
    }
}

/// Known leading-byte signatures, checked in order.
const SIGNATURES: &[Signature] = &[
    sig(0, b"%PDF-", "application/pdf"),
    sig(0, b"%!PS-Adobe-", "application/postscript"),
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png"),
    sig(0, b"\xff\xd8\xff", "image/jpeg"),
    sig(0, b"GIF87a", "image/gif"),
    sig(0, b"GIF89a", "image/gif"),
    sig(0, b"II*\x00", "image/tiff"),
    sig(0, b"MM\x00*", "image/tiff"),
    sig(0, b"BM", "image/bmp"),
    sig(0, b"\x1f\x8b", "application/gzip"),
    sig(0, b"BZh", "application/x-bzip2"),
    sig(0, b"\xfd7zXZ\x00", "application/x-xz"),
    sig(0, b"\x28\xb5\x2f\xfd", "application/zstd"),
    sig(0, b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    sig(0, b"PK\x03\x04", "application/zip"),
    sig(0, b"PK\x05\x06", "application/zip"),
    sig(0, b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/x-ole-storage"),
    sig(0, b"AT&TFORM", "image/vnd.djvu"),
    sig(0, b"{\\rtf", "text/rtf"),
    sig(0, b"\x7fELF", "application/x-elf"),
    sig(257, b"ustar", "application/x-tar"),
];

/// Guess the media type of a payload from its leading bytes.
///
/// Never fails: content matching no signature and not looking like text
/// is reported as [`UNKNOWN_MEDIA_TYPE`], as is the empty payload.
pub fn sniff_media_type(p: &[u8]) -> &'static str {
    if p.is_empty() {
        return UNKNOWN_MEDIA_TYPE;
    }
    let head = &p[..p.len().min(SNIFF_LEN)];

    for s in SIGNATURES {
        if head.len() >= s.offset + s.magic.len()
            && &head[s.offset..s.offset + s.magic.len()] == s.magic
        {
            return s.media_type;
        }
    }

    // RIFF containers carry their subtype at offset 8.
    if head.len() >= 12 && &head[..4] == b"RIFF" {
        match &head[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wav",
            b"AVI " => return "video/x-msvideo",
            _ => {}
        }
    }

    let trimmed = skip_bom_and_whitespace(head);
    if trimmed.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if starts_with_ignore_case(trimmed, b"<!doctype html")
        || starts_with_ignore_case(trimmed, b"<html")
    {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if looks_like_text(head) {
        return TEXT_MEDIA_TYPE;
    }
    UNKNOWN_MEDIA_TYPE
}

fn skip_bom_and_whitespace(mut p: &[u8]) -> &[u8] {
    if p.starts_with(&[0xEF, 0xBB, 0xBF]) {
        p = &p[3..];
    }
    while let Some((first, rest)) = p.split_first() {
        if first.is_ascii_whitespace() {
            p = rest;
        } else {
            break;
        }
    }
    p
}

fn starts_with_ignore_case(p: &[u8], prefix: &[u8]) -> bool {
    p.len() >= prefix.len() && p[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// UTF-8 without control characters other than common whitespace.
///
/// The sniff window may cut a multi-byte sequence at its end; an
/// incomplete trailing sequence still counts as text.
fn looks_like_text(head: &[u8]) -> bool {
    let valid = match std::str::from_utf8(head) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            match std::str::from_utf8(&head[..e.valid_up_to()]) {
                Ok(s) => s,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    !valid
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
}
