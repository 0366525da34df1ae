// HTTP client for the node agent's files API, per spec §4.3.
//
// The upstream exposes `GET <endpoint>?path=&offset=&length=` returning
// `{data, offset}` with no line awareness at all - everything the rest of
// `files/` does to turn that into a line-oriented stream starts here, with
// a plain byte-range fetch.

use std::time::Duration;

use async_std::future::timeout;

use crate::error::{GatewayError, Result};
use crate::model::{BrowseEntry, FilesChunk};

/// Per-call deadline for upstream files-API requests, per §5
/// (Suspension points).
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(3);

/// `data == ""` or `data == "\n"` both mean EOF, per §4.3.
pub fn is_eof_data(data: &str) -> bool {
    data.is_empty() || data == "\n"
}

#[derive(Clone)]
pub struct FilesApiClient {
    /// Base URL up to and including the agent, e.g.
    /// `http://127.0.0.1:5051`. The three endpoint suffixes
    /// (`/files/read`, `/files/browse`, `/files/download`) are appended per
    /// call.
    base_url: String,
    client: surf::Client,
    auth_header: Option<String>,
}

impl FilesApiClient {
    pub fn new(base_url: impl Into<String>, auth_header: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: surf::Client::new(),
            auth_header,
        }
    }

    fn apply_auth(&self, mut req: surf::RequestBuilder) -> surf::RequestBuilder {
        if let Some(token) = &self.auth_header {
            req = req.header("Authorization", token.as_str());
        }
        req
    }

    /// Fetch one `(data, offset)` chunk. Passing `offset = -1` is the
    /// file-length probe documented in §4.3: the upstream replies with
    /// `{data: "", offset: size}`.
    pub async fn fetch_chunk(&self, path: &str, offset: i64, length: usize) -> Result<FilesChunk> {
        let url = format!("{}/files/read.json", self.base_url);

        let req = self.apply_auth(self.client.get(&url)).query(&[
            ("path", path.to_string()),
            ("offset", offset.to_string()),
            ("length", length.to_string()),
        ]);

        let req = req.map_err(|e| GatewayError::Upstream(format!("bad request: {e}")))?;

        let mut resp = timeout(UPSTREAM_TIMEOUT, req.send())
            .await
            .map_err(|_| GatewayError::Upstream("files API request timed out".to_string()))?
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        match resp.status() {
            surf::StatusCode::Ok => {}
            surf::StatusCode::NotFound => return Err(GatewayError::NotFound(path.to_string())),
            other => {
                return Err(GatewayError::Upstream(format!(
                    "files API returned unexpected status {other}"
                )));
            }
        }

        let chunk: FilesChunk = resp
            .body_json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to decode files API reply: {e}")))?;

        Ok(chunk)
    }

    /// Probe the file's current length via `offset = -1`.
    pub async fn file_length(&self, path: &str) -> Result<i64> {
        let chunk = self.fetch_chunk(path, -1, 1).await?;
        Ok(chunk.offset)
    }

    pub async fn browse(&self, path: &str) -> Result<Vec<BrowseEntry>> {
        let url = format!("{}/files/browse", self.base_url);

        let req = self
            .apply_auth(self.client.get(&url))
            .query(&[("path", path)])
            .map_err(|e| GatewayError::Upstream(format!("bad request: {e}")))?;

        let mut resp = timeout(UPSTREAM_TIMEOUT, req.send())
            .await
            .map_err(|_| GatewayError::Upstream("browse request timed out".to_string()))?
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        match resp.status() {
            surf::StatusCode::Ok => {}
            surf::StatusCode::NotFound => return Err(GatewayError::NotFound(path.to_string())),
            other => {
                return Err(GatewayError::Upstream(format!(
                    "browse returned unexpected status {other}"
                )))
            }
        }

        resp.body_json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to decode browse reply: {e}")))
    }

    /// Issue the raw probe request used by the Authorization Gate (§4.7):
    /// only the status code is consulted by the caller.
    pub async fn probe_browse(&self, path: &str) -> Result<surf::StatusCode> {
        let url = format!("{}/files/browse", self.base_url);

        let req = self
            .apply_auth(self.client.get(&url))
            .query(&[("path", path)])
            .map_err(|e| GatewayError::Upstream(format!("bad request: {e}")))?;

        let resp = timeout(UPSTREAM_TIMEOUT, req.send())
            .await
            .map_err(|_| GatewayError::Upstream("probe request timed out".to_string()))?
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(resp.status())
    }

    /// Proxy the `/files/download` endpoint, preserving upstream headers
    /// (§4.3).
    pub async fn download(&self, path: &str) -> Result<surf::Response> {
        let url = format!("{}/files/download", self.base_url);

        let req = self
            .apply_auth(self.client.get(&url))
            .query(&[("path", path)])
            .map_err(|e| GatewayError::Upstream(format!("bad request: {e}")))?;

        let resp = timeout(UPSTREAM_TIMEOUT, req.send())
            .await
            .map_err(|_| GatewayError::Upstream("download request timed out".to_string()))?
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        match resp.status() {
            surf::StatusCode::NotFound => Err(GatewayError::NotFound(path.to_string())),
            _ => Ok(resp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_sentinels() {
        assert!(is_eof_data(""));
        assert!(is_eof_data("\n"));
        assert!(!is_eof_data("a\n"));
    }
}
