//! HTTP contract tests: a real listener on an ephemeral port, driven with
//! reqwest.

use std::path::Path;
use std::sync::Arc;

use blobproc::config::Config;
use blobproc::server::{serve, AppState};
use blobproc::spool::SpoolService;
use blobproc::urlmap::UrlMap;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::oneshot;

const SHA1_ABC: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

struct TestServer {
    base: String,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server(config: Config, spool: SpoolService) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = config;
    config.server.bind = addr.to_string();
    let state = AppState::new(&config, Arc::new(spool)).unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        serve(listener, state, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        _shutdown: tx,
    }
}

async fn start_default(dir: &Path) -> TestServer {
    start_server(Config::default(), SpoolService::new(dir.join("spool"))).await
}

#[tokio::test]
async fn test_banner_names_address() {
    let tmp = TempDir::new().unwrap();
    let srv = start_default(tmp.path()).await;

    let body = reqwest::get(format!("{}/", srv.base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let banner: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(banner["id"], "blobprocd");
    let about = banner["about"].as_str().unwrap();
    assert!(about.contains(srv.base.trim_start_matches("http://")));
    assert!(about.contains("/spool"));
}

#[tokio::test]
async fn test_post_then_status() {
    let tmp = TempDir::new().unwrap();
    let srv = start_default(tmp.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/spool", srv.base))
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, format!("/spool/{}", SHA1_ABC));
    let receipt: Value = resp.json().await.unwrap();
    assert_eq!(receipt["id"], SHA1_ABC);
    assert_eq!(receipt["status"], "accepted");
    assert_eq!(receipt["fingerprint"]["size"], 3);

    let status: Value = client
        .get(format!("{}{}", srv.base, location))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["id"], SHA1_ABC);
    assert_eq!(status["status"], "received");
    assert_eq!(
        status["fingerprint"]["sha256hex"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    assert!(tmp.path().join("spool/a9").join(SHA1_ABC).is_file());
}

#[tokio::test]
async fn test_put_duplicate_lists_once() {
    let tmp = TempDir::new().unwrap();
    let srv = start_default(tmp.path()).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .put(format!("{}/spool", srv.base))
            .body("%PDF-1.4 duplicate")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let list: Value = client
        .get(format!("{}/spool", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = list["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "received");
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let srv = start_default(tmp.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/spool", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_data");

    let list: Value = client
        .get(format!("{}/spool", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let tmp = TempDir::new().unwrap();
    let srv = start_default(tmp.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/spool/{}", srv.base, SHA1_ABC))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .get(format!("{}/spool/not-a-digest", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_as_too_large() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.max_body_bytes = 8;
    let srv = start_server(config, SpoolService::new(tmp.path().join("spool"))).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/spool", srv.base))
        .body("this body is longer than eight bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "too_large");
    assert!(!tmp.path().join("spool/a9").exists());
}

#[tokio::test]
async fn test_stalled_upload_is_a_transport_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.timeout_secs = 1;
    let srv = start_server(config, SpoolService::new(tmp.path().join("spool"))).await;

    // Announce 100 bytes, send 3, then stall.
    let mut stream = tokio::net::TcpStream::connect(srv.base.trim_start_matches("http://"))
        .await
        .unwrap();
    stream
        .write_all(b"POST /spool HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\nabc")
        .await
        .unwrap();

    let mut raw = Vec::new();
    let read = async {
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if String::from_utf8_lossy(&raw).contains("\"transport\"") {
                break;
            }
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(10), read)
        .await
        .unwrap();

    let text = String::from_utf8_lossy(&raw);
    assert!(text.starts_with("HTTP/1.1 408"), "{}", text);
    assert!(text.contains("application/json"), "{}", text);
    let json = &text[text.find('{').unwrap()..];
    let body: Value = serde_json::from_str(json).unwrap();
    assert_eq!(body["error"]["code"], "transport");
    assert!(!tmp.path().join("spool/a9").exists());
}

#[tokio::test]
async fn test_source_url_header_is_recorded() {
    let tmp = TempDir::new().unwrap();
    let urlmap = Arc::new(UrlMap::open(&tmp.path().join("urlmap.db")).await.unwrap());
    let spool = SpoolService::new(tmp.path().join("spool")).with_provenance(urlmap.clone());
    let mut config = Config::default();
    config.urlmap.header = "X-Source-URL".to_string();
    let srv = start_server(config, spool).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/spool", srv.base))
        .header("X-Source-URL", "https://example.org/paper.pdf")
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let rows = urlmap.by_url("https://example.org/paper.pdf").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sha1, SHA1_ABC);
    assert_eq!(urlmap.by_digest(SHA1_ABC).await.unwrap().len(), 1);
}
