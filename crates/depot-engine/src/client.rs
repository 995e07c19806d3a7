//! HTTP deploy client for Artifactory-compatible stores.

use std::time::Duration;

use depot_config::{DeployConfig, DEFAULT_CONNECTION_RETRIES, DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB};
use serde::Deserialize;

use crate::deploy::{DeployClient, UploadResponse};
use crate::details::DeployDetails;
use crate::error::DeployError;

const SHA1_HEADER: &str = "X-Checksum-Sha1";
const MD5_HEADER: &str = "X-Checksum-Md5";
const EXPLODE_HEADER: &str = "X-Explode-Archive";
const CHECKSUM_DEPLOY_HEADER: &str = "X-Checksum-Deploy";

/// Deploys artifacts with HTTP `PUT` requests.
///
/// Files of at least `min_checksum_deploy_size_kb` are first offered by
/// checksum only. If the store already holds that content it links it
/// without an upload; otherwise the full file is sent. An upload that fails
/// before the store answers is sent again up to `connection_retries` times.
#[derive(Debug)]
pub struct HttpDeployClient {
    agent: ureq::Agent,
    base_url: String,
    min_checksum_deploy_size_kb: u64,
    connection_retries: u32,
}

impl HttpDeployClient {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_connect(Some(Duration::from_secs(30)))
                .timeout_global(Some(Duration::from_secs(600)))
                .build(),
        );
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            min_checksum_deploy_size_kb: DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB,
            connection_retries: DEFAULT_CONNECTION_RETRIES,
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(&config.url)
            .with_min_checksum_deploy_size_kb(config.min_checksum_deploy_size_kb)
            .with_connection_retries(config.connection_retries)
    }

    #[must_use]
    pub fn with_min_checksum_deploy_size_kb(mut self, size_kb: u64) -> Self {
        self.min_checksum_deploy_size_kb = size_kb;
        self
    }

    /// `0` disables retrying.
    #[must_use]
    pub fn with_connection_retries(mut self, retries: u32) -> Self {
        self.connection_retries = retries;
        self
    }

    /// Full deploy URL, matrix params included.
    pub fn url_for(&self, details: &DeployDetails) -> String {
        depot_util::url::deployment_url(
            &self.base_url,
            details.target_repository(),
            details.artifact_path(),
            details.properties(),
        )
    }

    fn wants_checksum_deploy(&self, details: &DeployDetails, size: u64) -> bool {
        if details.explode() || details.sha1().is_none() {
            return false;
        }
        size >= self.min_checksum_deploy_size_kb.saturating_mul(1024)
    }

    fn put(
        &self,
        url: &str,
        details: &DeployDetails,
    ) -> ureq::RequestBuilder<ureq::typestate::WithBody> {
        let mut request = self.agent.put(url);
        if let Some(sha1) = details.sha1() {
            request = request.header(SHA1_HEADER, sha1);
        }
        if let Some(md5) = details.md5() {
            request = request.header(MD5_HEADER, md5);
        }
        request
    }

    fn try_checksum_deploy(&self, url: &str, details: &DeployDetails) -> Option<UploadResponse> {
        let result = self
            .put(url, details)
            .header(CHECKSUM_DEPLOY_HEADER, "true")
            .send_empty();
        match result {
            Ok(response) => match read_upload_response(url, response) {
                Ok(upload) => Some(upload),
                Err(e) => {
                    tracing::debug!(url, error = %e, "unreadable checksum deploy response");
                    None
                }
            },
            Err(e) => {
                tracing::debug!(
                    url,
                    sha1 = details.sha1().unwrap_or_default(),
                    error = %e,
                    "checksum deploy not accepted, uploading file"
                );
                None
            }
        }
    }

    /// Send the full file. Transport failures are retried with a freshly
    /// opened file; any status the store answers with is final.
    fn upload(
        &self,
        url: &str,
        details: &DeployDetails,
    ) -> Result<ureq::http::Response<ureq::Body>, DeployError> {
        let mut attempt = 0;
        loop {
            let file = open_file(details)?;
            let mut request = self.put(url, details);
            if details.explode() {
                request = request.header(EXPLODE_HEADER, "true");
            }
            match request.send(file) {
                Ok(response) => return Ok(response),
                Err(e @ ureq::Error::StatusCode(_)) => return Err(map_ureq_error(url, e)),
                Err(e) if attempt < self.connection_retries => {
                    attempt += 1;
                    tracing::warn!(
                        url,
                        attempt,
                        retries = self.connection_retries,
                        error = %e,
                        "upload failed, retrying"
                    );
                }
                Err(e) => return Err(map_ureq_error(url, e)),
            }
        }
    }
}

fn open_file(details: &DeployDetails) -> Result<std::fs::File, DeployError> {
    std::fs::File::open(details.file()).map_err(|source| DeployError::Io {
        path: details.file().display().to_string(),
        source,
    })
}

impl DeployClient for HttpDeployClient {
    fn deploy(
        &self,
        details: &DeployDetails,
        log_prefix: Option<&str>,
    ) -> Result<UploadResponse, DeployError> {
        let url = self.url_for(details);
        tracing::info!(prefix = log_prefix.unwrap_or_default(), url = %url, "deploying artifact");

        let size = open_file(details)?
            .metadata()
            .map_err(|source| DeployError::Io {
                path: details.file().display().to_string(),
                source,
            })?
            .len();

        if self.wants_checksum_deploy(details, size) {
            if let Some(upload) = self.try_checksum_deploy(&url, details) {
                return Ok(upload);
            }
        } else {
            tracing::debug!(url = %url, size, "skipping checksum deploy");
        }

        let response = self.upload(&url, details)?;

        // Exploded archives answer with a body that is not an upload record.
        if details.explode() {
            return Ok(UploadResponse::default());
        }
        read_upload_response(&url, response)
    }
}

/// The parts of the store's upload record the engine uses.
#[derive(Debug, Deserialize)]
struct UploadRecord {
    path: Option<String>,
    #[serde(default)]
    checksums: Option<UploadChecksums>,
}

#[derive(Debug, Deserialize)]
struct UploadChecksums {
    sha256: Option<String>,
}

fn read_upload_response(
    url: &str,
    response: ureq::http::Response<ureq::Body>,
) -> Result<UploadResponse, DeployError> {
    let body = response
        .into_body()
        .read_to_string()
        .map_err(|e| map_ureq_error(url, e))?;
    parse_upload_response(url, &body)
}

fn parse_upload_response(url: &str, body: &str) -> Result<UploadResponse, DeployError> {
    if body.trim().is_empty() {
        return Ok(UploadResponse::default());
    }
    let record: UploadRecord = serde_json::from_str(body).map_err(|e| DeployError::Response {
        url: url.to_owned(),
        message: e.to_string(),
    })?;
    Ok(UploadResponse {
        path: record
            .path
            .map(|p| p.trim_start_matches('/').to_owned())
            .filter(|p| !p.is_empty()),
        sha256: record.checksums.and_then(|c| c.sha256),
    })
}

fn map_ureq_error(url: &str, error: ureq::Error) -> DeployError {
    match error {
        ureq::Error::StatusCode(status) => DeployError::Status {
            url: url.to_owned(),
            status,
        },
        other => DeployError::Http {
            url: url.to_owned(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn details(dir: &Path, size: usize, explode: bool) -> DeployDetails {
        let file = dir.join("app.jar");
        std::fs::write(&file, vec![7u8; size]).unwrap();
        let checksums = depot_util::checksum::file_checksums(&file).unwrap();
        DeployDetails::builder()
            .file(file)
            .target_repository("libs-release-local")
            .artifact_path("org/acme/app/1.0/app 1.0.jar")
            .checksums(&checksums)
            .explode(explode)
            .add_property("build.name", "app")
            .build()
            .unwrap()
    }

    #[test]
    fn url_includes_encoded_path_and_properties() {
        let dir = tempfile::tempdir().unwrap();
        let client = HttpDeployClient::new("https://repo.example.com/artifactory/");
        assert_eq!(
            client.url_for(&details(dir.path(), 1, false)),
            "https://repo.example.com/artifactory/libs-release-local/org/acme/app/1.0/app%201.0.jar;build.name=app"
        );
    }

    #[test]
    fn checksum_deploy_only_for_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let client = HttpDeployClient::new("http://h");
        let small = details(dir.path(), 10, false);
        assert!(!client.wants_checksum_deploy(&small, 10 * 1024 - 1));
        assert!(client.wants_checksum_deploy(&small, 10 * 1024));
    }

    #[test]
    fn checksum_deploy_skipped_for_explode() {
        let dir = tempfile::tempdir().unwrap();
        let client = HttpDeployClient::new("http://h").with_min_checksum_deploy_size_kb(0);
        assert!(!client.wants_checksum_deploy(&details(dir.path(), 1, true), 1));
    }

    #[test]
    fn checksum_deploy_needs_sha1() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jar");
        std::fs::write(&file, b"x").unwrap();
        let details = DeployDetails::builder()
            .file(file)
            .target_repository("r")
            .artifact_path("a.jar")
            .build()
            .unwrap();
        let client = HttpDeployClient::new("http://h").with_min_checksum_deploy_size_kb(0);
        assert!(!client.wants_checksum_deploy(&details, 1));
    }

    #[test]
    fn from_config_uses_threshold() {
        let config = DeployConfig {
            url: "http://h/".to_owned(),
            repository: "r".to_owned(),
            publish_fork_count: 3,
            min_checksum_deploy_size_kb: 0,
            connection_retries: 7,
            include_patterns: String::new(),
            exclude_patterns: String::new(),
            properties: Default::default(),
        };
        let client = HttpDeployClient::from_config(&config);
        assert_eq!(client.base_url, "http://h");
        assert_eq!(client.min_checksum_deploy_size_kb, 0);
        assert_eq!(client.connection_retries, 7);
    }

    /// Consume one HTTP request, body included.
    fn read_request(stream: &TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        let mut chunked = false;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                return;
            }
            let header = line.trim_end().to_ascii_lowercase();
            if header.is_empty() {
                break;
            }
            if let Some(value) = header.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            if header.starts_with("transfer-encoding:") && header.contains("chunked") {
                chunked = true;
            }
        }
        if !chunked {
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            return;
        }
        loop {
            let mut size = String::new();
            reader.read_line(&mut size).unwrap();
            let size = usize::from_str_radix(size.trim(), 16).unwrap();
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).unwrap();
            if size == 0 {
                break;
            }
        }
    }

    fn respond(mut stream: TcpStream, status: &str, body: &str) {
        read_request(&stream);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
    }

    #[test]
    fn dropped_connection_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            let (first, _) = listener.accept().unwrap();
            drop(first);
            let (second, _) = listener.accept().unwrap();
            respond(
                second,
                "201 Created",
                r#"{"path": "/libs-release-local/a.jar"}"#
            );
        });

        let dir = tempfile::tempdir().unwrap();
        let client = HttpDeployClient::new(&base_url).with_connection_retries(2);
        let upload = client.deploy(&details(dir.path(), 16, false), None).unwrap();
        server.join().unwrap();

        assert_eq!(upload.path.as_deref(), Some("libs-release-local/a.jar"));
    }

    #[test]
    fn error_status_is_not_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&connections);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                seen.fetch_add(1, Ordering::SeqCst);
                respond(stream.unwrap(), "403 Forbidden", "");
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let client = HttpDeployClient::new(&base_url).with_connection_retries(3);
        let err = client
            .deploy(&details(dir.path(), 16, false), None)
            .unwrap_err();

        assert!(
            matches!(err, DeployError::Status { status: 403, .. }),
            "error was: {err}"
        );
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_exhausted_reports_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            for _ in 0..2 {
                let (stream, _) = listener.accept().unwrap();
                drop(stream);
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let client = HttpDeployClient::new(&base_url).with_connection_retries(1);
        let err = client
            .deploy(&details(dir.path(), 16, false), None)
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, DeployError::Http { .. }), "error was: {err}");
    }

    #[test]
    fn parse_full_upload_record() {
        let body = r#"{
            "repo": "libs-snapshot-local",
            "path": "/org/acme/app/1.0-SNAPSHOT/app-1.0-20240101.120000-1.jar",
            "size": "1024",
            "checksums": {"sha1": "aa", "md5": "bb", "sha256": "cc"}
        }"#;
        let upload = parse_upload_response("http://h", body).unwrap();
        assert_eq!(
            upload.path.as_deref(),
            Some("org/acme/app/1.0-SNAPSHOT/app-1.0-20240101.120000-1.jar")
        );
        assert_eq!(upload.sha256.as_deref(), Some("cc"));
    }

    #[test]
    fn parse_empty_body() {
        assert_eq!(
            parse_upload_response("http://h", "  ").unwrap(),
            UploadResponse::default()
        );
    }

    #[test]
    fn parse_invalid_body() {
        let err = parse_upload_response("http://h/x", "<html>").unwrap_err();
        assert!(matches!(err, DeployError::Response { .. }));
        assert!(err.to_string().contains("http://h/x"));
    }

    #[test]
    fn status_error_keeps_code() {
        let err = map_ureq_error("http://h/x", ureq::Error::StatusCode(403));
        assert!(
            matches!(err, DeployError::Status { status: 403, .. }),
            "error was: {err}"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let details = details(dir.path(), 1, false);
        std::fs::remove_file(details.file()).unwrap();

        let client = HttpDeployClient::new("http://127.0.0.1:9");
        let err = client.deploy(&details, None).unwrap_err();
        assert!(matches!(err, DeployError::Io { .. }), "error was: {err}");
    }
}
