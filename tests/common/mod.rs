// tests/common/mod.rs
//
// Shared fixtures: an in-memory Pollination artifact service on top of
// wiremock, tree builders and tar.gz helpers.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use pollination::{Config, Namespace, PollinationClient};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const OWNER: &str = "ada";
pub const PROJECT: &str = "demo";

pub fn namespace() -> Namespace {
    Namespace::new(OWNER, PROJECT)
}

/// Print test header with formatting
pub fn print_test_header(test_name: &str) {
    println!("\n{}", "=".repeat(60));
    println!("TEST: {}", test_name);
    println!("{}", "=".repeat(60));
}

/// Client pointed at `server`, with a token so no login happens.
pub fn client_for(server: &MockServer) -> PollinationClient {
    let config = Config::default().with_endpoint(server.uri()).with_access_token("test-token");
    PollinationClient::new(config).expect("client")
}

/// Write `files` (relative path, contents) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, body) in files {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }
}

/// Build a gzip-compressed tar holding `entries`.
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

// -----------------------------------------------------------------------------
// Multipart parsing (just enough for reqwest's encoder)
// -----------------------------------------------------------------------------

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

/// Field name -> raw bytes for a `multipart/form-data` body.
pub fn parse_multipart(content_type: &str, body: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut fields = BTreeMap::new();
    let Some(boundary) = content_type.split("boundary=").nth(1) else {
        return fields;
    };
    let delim = format!("--{}", boundary.trim_matches('"')).into_bytes();
    let Some(first) = find(body, &delim, 0) else {
        return fields;
    };
    let mut pos = first + delim.len();

    while !body[pos..].starts_with(b"--") {
        pos += 2; // CRLF after the delimiter
        let Some(header_end) = find(body, b"\r\n\r\n", pos) else { break };
        let headers = String::from_utf8_lossy(&body[pos..header_end]).into_owned();
        let content_start = header_end + 4;
        let Some(next) = find(body, &delim, content_start) else { break };
        let content = &body[content_start..next - 2];
        if let Some(name) = headers.split("name=\"").nth(1).and_then(|s| s.split('"').next()) {
            fields.insert(name.to_string(), content.to_vec());
        }
        pos = next + delim.len();
    }
    fields
}

// -----------------------------------------------------------------------------
// Fake artifact service
// -----------------------------------------------------------------------------

/// Shared state behind the fake service.
#[derive(Clone, Default)]
pub struct FakeState {
    pub blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    /// Tickets requested per key.
    pub ticket_requests: Arc<Mutex<BTreeMap<String, usize>>>,
    /// Keys whose ticket request answers 500.
    pub failing_tickets: Arc<Mutex<BTreeSet<String>>>,
    /// Status the upload target answers with; only 204 stores the blob.
    pub upload_status: Arc<AtomicU16>,
}

impl FakeState {
    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    pub fn put(&self, key: &str, body: &[u8]) {
        self.blobs.lock().unwrap().insert(key.to_string(), body.to_vec());
    }

    pub fn set_upload_status(&self, status: u16) {
        self.upload_status.store(status, Ordering::SeqCst);
    }

    pub fn fail_ticket(&self, key: &str) {
        self.failing_tickets.lock().unwrap().insert(key.to_string());
    }

    pub fn ticket_count(&self, key: &str) -> usize {
        self.ticket_requests.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

struct TicketResponder {
    state: FakeState,
    base: String,
}

impl Respond for TicketResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        let key = body["key"].as_str().unwrap_or_default().to_string();
        *self.state.ticket_requests.lock().unwrap().entry(key.clone()).or_default() += 1;
        if self.state.failing_tickets.lock().unwrap().contains(&key) {
            return ResponseTemplate::new(500).set_body_string("ticket service unavailable");
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/upload", self.base),
            "fields": { "key": key, "policy": "test-policy" }
        }))
    }
}

struct UploadResponder {
    state: FakeState,
}

impl Respond for UploadResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let fields = parse_multipart(&content_type, &request.body);
        let (Some(key), Some(file)) = (fields.get("key"), fields.get("file")) else {
            return ResponseTemplate::new(400);
        };
        if fields.get("policy").map(Vec::as_slice) != Some(b"test-policy".as_slice()) {
            return ResponseTemplate::new(403);
        }
        let status = self.state.upload_status.load(Ordering::SeqCst);
        if status == 204 {
            self.state.put(&String::from_utf8_lossy(key), file);
        }
        ResponseTemplate::new(status)
    }
}

struct ListingResponder {
    state: FakeState,
}

impl Respond for ListingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let base = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "path")
            .map(|(_, v)| v.trim_matches('/').to_string())
            .unwrap_or_default();
        let prefix = if base.is_empty() { String::new() } else { format!("{base}/") };

        let mut folders = BTreeSet::new();
        let mut entries = Vec::new();
        for (key, body) in self.state.blobs.lock().unwrap().iter() {
            let Some(rest) = key.strip_prefix(&prefix) else { continue };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    folders.insert(dir.to_string());
                }
                None => entries.push(json!({
                    "key": key,
                    "file_type": "file",
                    "file_name": rest,
                    "size": body.len(),
                })),
            }
        }
        for dir in folders {
            entries.push(json!({ "key": format!("{prefix}{dir}"), "file_type": "folder", "file_name": dir }));
        }
        ResponseTemplate::new(200).set_body_json(entries)
    }
}

struct DownloadUrlResponder {
    base: String,
}

impl Respond for DownloadUrlResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match request.url.query_pairs().find(|(k, _)| k == "path") {
            Some((_, key)) => ResponseTemplate::new(200).set_body_json(format!("{}/blobs/{}", self.base, key)),
            None => ResponseTemplate::new(400),
        }
    }
}

struct BlobResponder {
    state: FakeState,
}

impl Respond for BlobResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let key = request.url.path().trim_start_matches("/blobs/");
        match self.state.blob(key) {
            Some(body) => ResponseTemplate::new(200).set_body_bytes(body),
            None => ResponseTemplate::new(404),
        }
    }
}

pub fn artifacts_path() -> String {
    format!("/projects/{OWNER}/{PROJECT}/artifacts")
}

/// Start a fake artifact service for `namespace()`. Uploads are confirmed
/// with 204 unless the state says otherwise.
pub async fn start_fake_service() -> (MockServer, FakeState) {
    let server = MockServer::start().await;
    let state = FakeState::default();
    state.set_upload_status(204);
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path(artifacts_path()))
        .respond_with(TicketResponder { state: state.clone(), base: base.clone() })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(UploadResponder { state: state.clone() })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(artifacts_path()))
        .respond_with(ListingResponder { state: state.clone() })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/download", artifacts_path())))
        .respond_with(DownloadUrlResponder { base })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/blobs/.+$"))
        .respond_with(BlobResponder { state: state.clone() })
        .mount(&server)
        .await;

    (server, state)
}
