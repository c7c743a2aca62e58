//! # blobprocd
//!
//! Takes blobs via HTTP `POST` or `PUT` and saves them to a
//! content-addressed spool.
//!
//! ## Usage
//!
//! ```bash
//! blobprocd [--config blobproc.toml] [--spool DIR] [--addr HOST:PORT] [-T SECS]
//! blobprocd inspect <FILE>
//! ```
//!
//! Flags override values from the configuration file; without a file, the
//! built-in defaults apply.
//!
//! ## Examples
//!
//! ```bash
//! # Serve on the default address, recording source URLs
//! blobprocd --urlmap ~/.local/share/blobproc/urlmap.db
//!
//! # Spool a PDF, recording where it came from
//! curl -v --data-binary @paper.pdf -H "X-BLOBPROC-URL: https://example.org/paper.pdf" \
//!     http://localhost:8000/spool
//!
//! # Fingerprint a local file (and run pdfinfo on PDFs)
//! blobprocd inspect paper.pdf
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobproc::config::{load_config, Config};
use blobproc::fingerprint::Fingerprint;
use blobproc::logging;
use blobproc::pdfinfo::run_pdfinfo;
use blobproc::server;
use blobproc::spool::SpoolService;
use blobproc::urlmap::UrlMap;
use blobproc_core::pdfinfo::Info;

/// blobprocd: spool blobs received over HTTP.
#[derive(Parser)]
#[command(
    name = "blobprocd",
    version,
    about = "Receive blobs over HTTP and keep them in a content-addressed spool"
)]
struct Cli {
    /// Path to an optional configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Spool directory.
    #[arg(long)]
    spool: Option<PathBuf>,

    /// Host and port to listen on.
    #[arg(long)]
    addr: Option<String>,

    /// Server read/write timeout in seconds.
    #[arg(short = 'T', long)]
    timeout: Option<u64>,

    /// Switch to log level DEBUG.
    #[arg(long)]
    debug: bool,

    /// Structured log output file, stderr if not set.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Server access log file, none if not set.
    #[arg(long)]
    access_log: Option<PathBuf>,

    /// SQLite file recording (url, sha1) pairs; nothing is recorded if not set.
    #[arg(long)]
    urlmap: Option<PathBuf>,

    /// HTTP header carrying the source URL for the URL map.
    #[arg(long)]
    urlmap_header: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (the default).
    Serve,

    /// Print the fingerprint of a file, plus pdfinfo metadata for PDFs.
    Inspect {
        /// File to inspect.
        file: PathBuf,
    },
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.spool {
            config.spool.dir = dir.clone();
        }
        if let Some(addr) = &self.addr {
            config.server.bind = addr.clone();
        }
        if let Some(secs) = self.timeout {
            config.server.timeout_secs = secs;
        }
        if self.debug {
            config.log.debug = true;
        }
        if let Some(path) = &self.log {
            config.log.file = Some(path.clone());
        }
        if let Some(path) = &self.access_log {
            config.log.access_log = Some(path.clone());
        }
        if let Some(path) = &self.urlmap {
            config.urlmap.path = Some(path.clone());
        }
        if let Some(header) = &self.urlmap_header {
            config.urlmap.header = header.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    match &cli.command {
        None | Some(Commands::Serve) => serve(&config).await,
        Some(Commands::Inspect { file }) => inspect(file).await,
    }
}

async fn serve(config: &Config) -> Result<()> {
    logging::init(&config.log)?;

    let mut spool = SpoolService::new(&config.spool.dir);
    spool.ensure_dirs().await?;
    spool.clean_tmp().await?;
    if let Some(path) = &config.urlmap.path {
        let urlmap = UrlMap::open(path).await?;
        tracing::info!(path = %path.display(), header = %config.urlmap.header, "recording url map");
        spool = spool.with_provenance(Arc::new(urlmap));
    }

    server::run_server(config, Arc::new(spool)).await
}

#[derive(Serialize)]
struct InspectReport {
    fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pdfinfo: Option<Info>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pdfinfo_error: Option<String>,
}

async fn inspect(file: &Path) -> Result<()> {
    let owned = file.to_path_buf();
    let fingerprint = tokio::task::spawn_blocking(move || Fingerprint::from_file(&owned)).await??;

    let mut report = InspectReport {
        fingerprint,
        pdfinfo: None,
        pdfinfo_error: None,
    };
    if report.fingerprint.mimetype == "application/pdf" {
        match run_pdfinfo(file).await {
            Ok(info) => report.pdfinfo = Some(info),
            Err(e) => report.pdfinfo_error = Some(e.to_string()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
