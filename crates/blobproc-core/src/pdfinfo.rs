//! Tolerant parser for `pdfinfo` reports.
//!
//! The poppler `pdfinfo` tool prints one `Label:   value` pair per line.
//! [`parse_info`] turns such a report into an [`Info`] record. Parsing is
//! total: unknown labels, malformed lines and garbage values are ignored
//! and leave the corresponding field at its zero value. There is no error
//! path; running the tool itself is the caller's concern.
//!
//! # Field rules
//!
//! | Kind | Rule |
//! |------|------|
//! | text | value with surrounding whitespace trimmed |
//! | boolean | `true` only when the value is `yes` (trailing detail allowed, e.g. `yes (print:no)`) |
//! | integer | leading run of ASCII digits, e.g. `633850 bytes` → `633850`; no digits → `0` |
//!
//! # Example
//!
//! ```rust
//! use blobproc_core::pdfinfo::{parse_info, PageDim};
//!
//! let info = parse_info("Pages:           8\nPage size:       612 x 792 pts (letter)\n");
//! assert_eq!(info.pages, 8);
//! assert_eq!(info.page_dim, PageDim { width: 612.0, height: 792.0 });
//! ```

use serde::{Deserialize, Serialize};

/// Page width and height in points.
///
/// The all-zero value means "unknown", never a zero-area page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDim {
    pub width: f64,
    pub height: f64,
}

impl PageDim {
    /// Extract the dimension from a page size string such as
    /// `612 x 792 pts (letter)`.
    ///
    /// The first three whitespace-separated tokens must be a float, the
    /// literal `x`, and a float. Anything else yields the empty dimension.
    pub fn parse(raw: &str) -> PageDim {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "x" {
            return PageDim::default();
        }
        match (fields[0].parse::<f64>(), fields[2].parse::<f64>()) {
            (Ok(width), Ok(height)) => PageDim { width, height },
            _ => PageDim::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

/// Typed projection of a `pdfinfo` report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub subject: String,
    pub keywords: String,
    pub author: String,
    pub creator: String,
    pub producer: String,
    pub creation_date: String,
    pub mod_date: String,
    pub custom_metadata: bool,
    pub metadata_stream: bool,
    pub tagged: bool,
    pub user_properties: bool,
    pub suspects: bool,
    pub form: String,
    pub javascript: bool,
    pub pages: u32,
    pub encrypted: bool,
    /// Raw `Page size` value, kept verbatim.
    pub page_size: String,
    /// Dimension parsed from [`Info::page_size`].
    pub page_dim: PageDim,
    pub page_rot: u32,
    pub file_size: u64,
    pub optimized: bool,
    pub pdf_version: String,
}

/// Parse a `pdfinfo` report. Never fails.
pub fn parse_info(s: &str) -> Info {
    let mut info = Info::default();
    for line in s.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match label.trim() {
            "Title" => info.title = value.to_string(),
            "Subject" => info.subject = value.to_string(),
            "Keywords" => info.keywords = value.to_string(),
            "Author" => info.author = value.to_string(),
            "Creator" => info.creator = value.to_string(),
            "Producer" => info.producer = value.to_string(),
            "CreationDate" => info.creation_date = value.to_string(),
            "ModDate" => info.mod_date = value.to_string(),
            "Custom Metadata" => info.custom_metadata = parse_yes(value),
            "Metadata Stream" => info.metadata_stream = parse_yes(value),
            "Tagged" => info.tagged = parse_yes(value),
            "UserProperties" => info.user_properties = parse_yes(value),
            "Suspects" => info.suspects = parse_yes(value),
            "Form" => info.form = value.to_string(),
            "JavaScript" => info.javascript = parse_yes(value),
            "Pages" => info.pages = leading_int(value),
            "Encrypted" => info.encrypted = parse_yes(value),
            "Page size" => {
                info.page_size = value.to_string();
                info.page_dim = PageDim::parse(value);
            }
            "Page rot" => info.page_rot = leading_int(value),
            "File size" => info.file_size = leading_int(value),
            "Optimized" => info.optimized = parse_yes(value),
            "PDF version" => info.pdf_version = value.to_string(),
            _ => {}
        }
    }
    info
}

fn parse_yes(value: &str) -> bool {
    value.split_whitespace().next() == Some("yes")
}

/// Leading ASCII digits of `value` parsed as an integer, zero otherwise
/// (including on overflow).
fn leading_int<T: std::str::FromStr + Default>(value: &str) -> T {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_dim() {
        let cases: &[(Option<&str>, PageDim)] = &[
            (None, PageDim::default()),
            (Some(""), PageDim::default()),
            (Some("garbage"), PageDim::default()),
            (Some("100 garbage"), PageDim::default()),
            (Some("100 100 ambiguous string"), PageDim::default()),
            (Some("100 X 100 pts"), PageDim::default()),
            (Some("a x 100"), PageDim::default()),
            (
                Some("612 x 792 pts (letter)"),
                PageDim {
                    width: 612.0,
                    height: 792.0,
                },
            ),
            (
                Some("595.32 x 841.92 pts (A4)"),
                PageDim {
                    width: 595.32,
                    height: 841.92,
                },
            ),
            (
                Some("612 x 792"),
                PageDim {
                    width: 612.0,
                    height: 792.0,
                },
            ),
        ];
        for (raw, want) in cases {
            let got = raw.map(PageDim::parse).unwrap_or_default();
            assert_eq!(got, *want, "input: {:?}", raw);
        }
    }

    #[test]
    fn test_empty_dim_is_unknown() {
        assert!(PageDim::parse("").is_empty());
        assert!(!PageDim::parse("1 x 1").is_empty());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_info(""), Info::default());
    }

    #[test]
    fn test_parse_garbage() {
        let info = parse_info("no colon here\n:::\nPages: many\nFile size: bytes\nUnknown: 12\n");
        assert_eq!(info, Info::default());
    }

    #[test]
    fn test_parse_short_block() {
        let s = "Custom Metadata: yes\nPages: 8\nPage size: 595.276 x 841.89 pts (A4)\nPage rot: 0\nFile size: 633850 bytes\nPDF version: 1.5";
        let info = parse_info(s);
        assert!(info.custom_metadata);
        assert_eq!(info.pages, 8);
        assert_eq!(info.page_size, "595.276 x 841.89 pts (A4)");
        assert_eq!(info.page_rot, 0);
        assert_eq!(info.file_size, 633850);
        assert_eq!(info.pdf_version, "1.5");
    }

    #[test]
    fn test_parse_latex_report() {
        let s = "
			Title:
			Subject:
			Keywords:
			Author:
			Creator:         LaTeX with hyperref package
			Producer:        pdfTeX-1.40.17
			CreationDate:    Fri Jun  7 02:39:17 2019 CEST
			ModDate:         Fri Jun  7 02:39:17 2019 CEST
			Custom Metadata: yes
			Metadata Stream: no
			Tagged:          no
			UserProperties:  no
			Suspects:        no
			Form:            none
			JavaScript:      no
			Pages:           8
			Encrypted:       no
			Page size:       595.276 x 841.89 pts (A4)
			Page rot:        0
			File size:       633850 bytes
			Optimized:       no
			PDF version:     1.5
			";
        let want = Info {
            creator: "LaTeX with hyperref package".to_string(),
            producer: "pdfTeX-1.40.17".to_string(),
            creation_date: "Fri Jun  7 02:39:17 2019 CEST".to_string(),
            mod_date: "Fri Jun  7 02:39:17 2019 CEST".to_string(),
            custom_metadata: true,
            form: "none".to_string(),
            pages: 8,
            page_size: "595.276 x 841.89 pts (A4)".to_string(),
            page_dim: PageDim {
                width: 595.276,
                height: 841.89,
            },
            file_size: 633850,
            pdf_version: "1.5".to_string(),
            ..Info::default()
        };
        assert_eq!(parse_info(s), want);
    }

    #[test]
    fn test_parse_word_report() {
        let s = "
			Title:           Choose the red pill <i>and</i> the blue pill: a position paper
			Keywords:        authentication, authorization, blue pill, trusted path
			Author:          Ben Laurie, Abe Singer
			Creator:         Microsoft Word
			Producer:        Mac OS X 10.5.5 Quartz PDFContext
			Metadata Stream: yes
			Pages:           7
			Encrypted:       yes (print:yes copy:no change:no addNotes:no)
			Page size:       612 x 792 pts (letter)
			Page rot:        90
			File size:       419698 bytes
			Optimized:       yes
			PDF version:     1.3
			";
        let info = parse_info(s);
        assert_eq!(
            info.title,
            "Choose the red pill <i>and</i> the blue pill: a position paper"
        );
        assert_eq!(info.author, "Ben Laurie, Abe Singer");
        assert!(info.metadata_stream);
        assert!(info.encrypted);
        assert!(info.optimized);
        assert!(!info.custom_metadata);
        assert_eq!(info.pages, 7);
        assert_eq!(info.page_rot, 90);
        assert_eq!(info.file_size, 419698);
        assert_eq!(
            info.page_dim,
            PageDim {
                width: 612.0,
                height: 792.0
            }
        );
    }

    #[test]
    fn test_boolean_requires_yes() {
        let info = parse_info("Tagged: Yes\nOptimized: y\nSuspects: yesno\n");
        assert!(!info.tagged);
        assert!(!info.optimized);
        assert!(!info.suspects);
    }

    #[test]
    fn test_integer_overflow_is_zero() {
        let info = parse_info("Pages: 99999999999999999999\n");
        assert_eq!(info.pages, 0);
    }
}
