use super::{ObjectStore, StorageError, UploadCursor};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::time::Duration;
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com";
const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DIRECT_DOWNLOAD_HOST: &str = "dl.dropboxusercontent.com";

/// Base URLs for the two Dropbox API hosts.
///
/// RPC-style calls (sharing) go to `api`, file transfer calls go to `content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropboxEndpoints {
    pub api: String,
    pub content: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            api: DEFAULT_API_BASE.to_string(),
            content: DEFAULT_CONTENT_BASE.to_string(),
        }
    }
}

impl DropboxEndpoints {
    /// Routes both hosts to one base URL (used with a mock server).
    pub fn single(base: &str) -> Self {
        Self {
            api: base.to_string(),
            content: base.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

#[derive(Deserialize)]
struct SessionStart {
    session_id: String,
}

#[derive(Deserialize)]
struct SharedLink {
    url: String,
}

#[derive(Deserialize)]
struct SharedLinkList {
    links: Vec<SharedLink>,
}

/// [`ObjectStore`] backed by the Dropbox HTTP API (v2).
pub struct DropboxClient {
    http: reqwest::Client,
    token: SecretString,
    endpoints: DropboxEndpoints,
    timeout: Duration,
}

/// Masks the access token in Debug output.
impl std::fmt::Debug for DropboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxClient")
            .field("token", &"[REDACTED]")
            .field("endpoints", &self.endpoints)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DropboxClient {
    pub fn new(token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            endpoints: DropboxEndpoints::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Builds a client against custom endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InsecureBaseUrl`] if an endpoint is not HTTPS.
    /// Plain HTTP is accepted for `localhost`/`127.0.0.1` so tests can use a
    /// local mock server.
    pub fn with_endpoints(
        http: reqwest::Client,
        token: SecretString,
        endpoints: DropboxEndpoints,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        validate_base_url(&endpoints.api)?;
        validate_base_url(&endpoints.content)?;

        if endpoints != DropboxEndpoints::default() {
            tracing::info!(
                api = %endpoints.api,
                content = %endpoints.content,
                "Using custom Dropbox API endpoints"
            );
        }

        Ok(Self {
            http,
            token,
            endpoints,
            timeout,
        })
    }

    fn content_url(&self, endpoint: &str) -> String {
        format!("{}/2/{}", self.endpoints.content.trim_end_matches('/'), endpoint)
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/2/{}", self.endpoints.api.trim_end_matches('/'), endpoint)
    }

    /// Calls a content-upload style endpoint: arguments in the
    /// `Dropbox-API-Arg` header, raw bytes in the body.
    async fn content_call(
        &self,
        endpoint: &str,
        arg: &Value,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StorageError> {
        let request = self
            .http
            .post(self.content_url(endpoint))
            .bearer_auth(self.token.expose_secret())
            .header("Dropbox-API-Arg", header_safe_json(arg))
            .header("Content-Type", "application/octet-stream")
            .body(body);
        self.send(request).await
    }

    /// Calls an RPC endpoint with a JSON body and decodes the JSON response.
    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        arg: &Value,
    ) -> Result<T, StorageError> {
        let request = self
            .http
            .post(self.api_url(endpoint))
            .bearer_auth(self.token.expose_secret())
            .header("Content-Type", "application/json")
            .body(arg.to_string());
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidResponse(e.to_string()))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StorageError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| StorageError::Timeout)?
            .map_err(StorageError::Network)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Endpoint-specific failures come back as 409 with a JSON error body
        if status == reqwest::StatusCode::CONFLICT {
            let body = response.bytes().await?;
            let summary = match serde_json::from_slice::<ApiErrorBody>(&body) {
                Ok(err) => err.error_summary,
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            return Err(StorageError::Api(summary));
        }

        Err(StorageError::HttpStatus(status.as_u16()))
    }

    async fn start_session(&self, data: Vec<u8>) -> Result<UploadCursor, StorageError> {
        let len = data.len();
        let response = self
            .content_call("files/upload_session/start", &json!({ "close": false }), data)
            .await?;
        let bytes = response.bytes().await?;
        let start: SessionStart = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        tracing::debug!(session = %start.session_id, bytes = len, "Upload session started");
        Ok(UploadCursor {
            session_id: start.session_id,
            offset: len as u64,
        })
    }

    async fn shared_link(&self, path: &str) -> Result<String, StorageError> {
        let created = self
            .rpc_call::<SharedLink>(
                "sharing/create_shared_link_with_settings",
                &json!({ "path": path }),
            )
            .await;

        match created {
            Ok(link) => Ok(link.url),
            Err(StorageError::Api(summary)) if summary.starts_with("shared_link_already_exists") => {
                tracing::debug!(path = %path, "Shared link exists, listing instead");
                let list: SharedLinkList = self
                    .rpc_call(
                        "sharing/list_shared_links",
                        &json!({ "path": path, "direct_only": true }),
                    )
                    .await?;
                list.links
                    .into_iter()
                    .next()
                    .map(|l| l.url)
                    .ok_or_else(|| {
                        StorageError::InvalidResponse(format!("no shared link listed for {path}"))
                    })
            }
            Err(e) => Err(map_path_error(e, path)),
        }
    }
}

#[async_trait]
impl ObjectStore for DropboxClient {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .content_call("files/download", &json!({ "path": path }), Vec::new())
            .await
            .map_err(|e| map_path_error(e, path))?;

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        tracing::debug!(path = %path, bytes = bytes.len(), "Downloaded file");
        Ok(bytes)
    }

    async fn public_url(&self, path: &str) -> Result<String, StorageError> {
        let shared = self.shared_link(path).await?;
        direct_download_url(&shared)
    }

    async fn upload_step(
        &self,
        data: Vec<u8>,
        cursor: Option<&UploadCursor>,
    ) -> Result<UploadCursor, StorageError> {
        let Some(cursor) = cursor else {
            return self.start_session(data).await;
        };

        let len = data.len();
        let arg = json!({
            "cursor": { "session_id": cursor.session_id, "offset": cursor.offset },
            "close": false,
        });
        self.content_call("files/upload_session/append_v2", &arg, data)
            .await?;
        Ok(cursor.advanced(len))
    }

    async fn finish_upload(
        &self,
        path: &str,
        cursor: Option<&UploadCursor>,
    ) -> Result<(), StorageError> {
        let cursor = match cursor {
            Some(c) => c.clone(),
            None => self.start_session(Vec::new()).await?,
        };

        let arg = json!({
            "cursor": { "session_id": cursor.session_id, "offset": cursor.offset },
            "commit": {
                "path": path,
                "mode": "overwrite",
                "autorename": false,
                "mute": true,
            },
        });
        self.content_call("files/upload_session/finish", &arg, Vec::new())
            .await
            .map_err(|e| map_path_error(e, path))?;

        tracing::debug!(path = %path, bytes = cursor.offset, "Upload session finished");
        Ok(())
    }
}

/// Rejects non-HTTPS base URLs, except plain HTTP on localhost.
fn validate_base_url(base: &str) -> Result<(), StorageError> {
    if base.starts_with("https://") {
        return Ok(());
    }
    let is_localhost = base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
    if !is_localhost {
        tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL (HTTPS required except for localhost)");
        return Err(StorageError::InsecureBaseUrl);
    }
    tracing::warn!(base_url = %base, "Using non-HTTPS Dropbox base URL (localhost only)");
    Ok(())
}

fn map_path_error(err: StorageError, path: &str) -> StorageError {
    match err {
        StorageError::Api(summary) if summary.starts_with("path/not_found") => {
            StorageError::NotFound(path.to_string())
        }
        other => other,
    }
}

/// Serializes `arg` for an HTTP header: every non-ASCII character is
/// written as a `\uXXXX` escape.
fn header_safe_json(arg: &Value) -> String {
    let raw = arg.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

/// Turns a shared-link page URL into a direct download URL.
///
/// `https://www.dropbox.com/s/abc/feed.xml?dl=0` becomes
/// `https://dl.dropboxusercontent.com/s/abc/feed.xml`.
pub(crate) fn direct_download_url(shared: &str) -> Result<String, StorageError> {
    let mut url = Url::parse(shared)
        .map_err(|e| StorageError::InvalidResponse(format!("bad shared link {shared}: {e}")))?;

    if matches!(url.host_str(), Some("www.dropbox.com") | Some("dropbox.com")) {
        url.set_host(Some(DIRECT_DOWNLOAD_HOST))
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "dl")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    Ok(url.to_string())
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, StorageError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(StorageError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StorageError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(StorageError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
