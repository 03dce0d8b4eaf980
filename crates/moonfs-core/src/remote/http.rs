//! Blocking HTTP implementations of the remote collaborator traits.
//!
//! All calls go through one [`Session`], which owns the agent, the base URL
//! and the auth token. The registry speaks JSON over the `/fuse/*` routes;
//! the content store moves raw bytes over `/download/{cid}` and `/upload`.
//! Authentication is a `token` cookie on every request.

use std::io::Read as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::fs::{ContentId, Stat};
use crate::remote::{ContentStore, MetadataRegistry, RemoteAttr, RemoteError, TransportError};

/// Shared connection state: agent, endpoint and credentials.
pub struct Session {
    base_url: Url,
    token: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session against `base_url` with a per-call timeout.
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url).map_err(|e| TransportError::Malformed {
            endpoint: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            // Non-2xx statuses are handled per endpoint (404 means NotFound,
            // not a transport failure).
            .http_status_as_error(false)
            .build()
            .new_agent();
        Ok(Self {
            base_url,
            token,
            agent,
        })
    }

    /// Verify the remote is reachable and the token is accepted.
    pub fn ping(&self) -> Result<(), TransportError> {
        let url = self.endpoint("health", &[])?;
        let (status, _) = self.run(http::Method::GET, &url, None)?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(TransportError::Status {
                status,
                endpoint: "health".into(),
            })
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| TransportError::Malformed {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    /// Issue one request, returning the status and full body.
    fn run(
        &self,
        method: http::Method,
        url: &Url,
        body: Option<(&'static str, Vec<u8>)>,
    ) -> Result<(u16, Vec<u8>), TransportError> {
        let endpoint = url.path().to_string();
        let builder = http::Request::builder()
            .method(method)
            .uri(url.as_str())
            .header("Cookie", format!("token={}", self.token));

        let result = match body {
            Some((content_type, payload)) => {
                let req = builder
                    .header("Content-Type", content_type)
                    .body(payload)
                    .map_err(|e| TransportError::Malformed {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    })?;
                self.agent.run(req)
            }
            None => {
                let req = builder
                    .body(Vec::new())
                    .map_err(|e| TransportError::Malformed {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    })?;
                self.agent.run(req)
            }
        };

        let response = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Timeout(_)) => return Err(TransportError::Timeout),
            Err(ureq::Error::HostNotFound) => {
                return Err(TransportError::Connection("host not found".to_owned()));
            }
            Err(ureq::Error::Io(e)) => return Err(TransportError::Connection(e.to_string())),
            Err(e) => return Err(TransportError::Connection(e.to_string())),
        };

        let (parts, body) = response.into_parts();
        let mut bytes = Vec::new();
        body.into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        debug!(endpoint = %endpoint, status = parts.status.as_u16(), len = bytes.len(), "remote call");
        Ok((parts.status.as_u16(), bytes))
    }

    /// GET helper with the common status mapping: 2xx passes the body
    /// through, 404 is `NotFound`, anything else is a status error.
    fn get_checked(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, RemoteError> {
        let url = self.endpoint(path, query)?;
        let (status, body) = self.run(http::Method::GET, &url, None)?;
        match status {
            200..=299 => Ok(body),
            404 => Err(RemoteError::NotFound),
            _ => Err(TransportError::Status {
                status,
                endpoint: path.to_string(),
            }
            .into()),
        }
    }

    fn parse_json<T: for<'de> Deserialize<'de>>(
        endpoint: &str,
        body: &[u8],
    ) -> Result<T, RemoteError> {
        serde_json::from_slice(body).map_err(|e| {
            TransportError::Malformed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    st: Stat,
    #[serde(default)]
    cid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    cid: String,
}

/// Registry client over the `/fuse/*` routes.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    session: Arc<Session>,
}

impl HttpRegistry {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl MetadataRegistry for HttpRegistry {
    fn lookup_attributes(&self, path: &str) -> Result<RemoteAttr, RemoteError> {
        let body = self.session.get_checked("fuse/info/", &[("path", path)])?;
        let info: InfoResponse = Session::parse_json("fuse/info/", &body)?;
        Ok(RemoteAttr {
            stat: info.st,
            content_id: info.cid.map(ContentId::from_raw),
        })
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>, RemoteError> {
        let body = self
            .session
            .get_checked("fuse/dir/read/", &[("path", path)])?;
        Session::parse_json("fuse/dir/read/", &body)
    }

    // The exists route answers 404 for an absent path and a JSON record for
    // a present one; absence is a normal outcome here, not an error.
    fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        match self.session.get_checked("fuse/file/exists", &[("path", path)]) {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let url = self.session.endpoint("delete", &[])?;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("path", path)
            .finish();
        let (status, _) = self.session.run(
            http::Method::POST,
            &url,
            Some(("application/x-www-form-urlencoded", form.into_bytes())),
        )?;
        match status {
            200..=299 => Ok(()),
            404 => Err(RemoteError::NotFound),
            _ => Err(TransportError::Status {
                status,
                endpoint: "delete".into(),
            }
            .into()),
        }
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), RemoteError> {
        let url = self
            .session
            .endpoint("rename", &[("old", old), ("new", new)])?;
        let (status, _) = self.session.run(http::Method::PUT, &url, None)?;
        match status {
            200..=299 => Ok(()),
            404 => Err(RemoteError::NotFound),
            _ => Err(TransportError::Status {
                status,
                endpoint: "rename".into(),
            }
            .into()),
        }
    }
}

/// Content-store client over `/download/{cid}` and `/upload`.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    session: Arc<Session>,
}

impl HttpContentStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl ContentStore for HttpContentStore {
    fn fetch_range(
        &self,
        content_id: &ContentId,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, RemoteError> {
        let route = format!("download/{}", content_id.as_str());
        let offset_s = offset.to_string();
        let len_s = len.to_string();
        let body = self
            .session
            .get_checked(&route, &[("offset", &offset_s), ("chunk_size", &len_s)])?;
        if body.len() != len {
            return Err(TransportError::Malformed {
                endpoint: route,
                reason: format!("requested {len} bytes, got {}", body.len()),
            }
            .into());
        }
        Ok(body)
    }

    fn store(&self, path: &str, payload: &[u8]) -> Result<ContentId, RemoteError> {
        let url = self.session.endpoint("upload", &[("path", path)])?;
        let (status, body) = self.session.run(
            http::Method::POST,
            &url,
            Some(("application/octet-stream", payload.to_vec())),
        )?;
        match status {
            200..=299 => {
                let resp: UploadResponse = Session::parse_json("upload", &body)?;
                Ok(ContentId::from_raw(resp.cid))
            }
            _ => Err(TransportError::Status {
                status,
                endpoint: "upload".into(),
            }
            .into()),
        }
    }
}
