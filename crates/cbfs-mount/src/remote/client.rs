use std::time::{Duration, SystemTime};

use chrono::DateTime;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use url::Url;

use super::error::RemoteError;
use super::listing::DirectoryListing;
use super::{Blob, RemoteStore};

/// Blocking HTTP implementation of [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    root: Url,
    client: Client,
}

impl HttpRemote {
    pub fn new(root: &Url) -> Result<Self, RemoteError> {
        Self::with_timeout(root, None)
    }

    /// Build a client whose requests give up after `timeout`. Without one the
    /// HTTP client's own default applies.
    pub fn with_timeout(root: &Url, timeout: Option<Duration>) -> Result<Self, RemoteError> {
        if root.cannot_be_a_base() {
            return Err(RemoteError::InvalidRoot(root.clone()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            root: root.clone(),
            client,
        })
    }

    fn listing_url(&self, path: &str) -> Result<Url, RemoteError> {
        let mut url = self.url_for(&[".cbfs", "list"], path, true)?;
        url.set_query(Some("includeMeta=true"));
        Ok(url)
    }

    fn blob_url(&self, path: &str) -> Result<Url, RemoteError> {
        self.url_for(&[], path, false)
    }

    /// Replace the root's path with `prefix` followed by the segments of
    /// `path`. Each segment is percent-encoded on its own, so `%`, `?` and
    /// `#` in a name stay part of that name.
    fn url_for(
        &self,
        prefix: &[&str],
        path: &str,
        trailing_slash: bool,
    ) -> Result<Url, RemoteError> {
        let mut url = self.root.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::InvalidRoot(self.root.clone()))?;
            segments.clear();
            segments.extend(prefix);
            segments.extend(path.split('/').filter(|seg| !seg.is_empty()));
            if trailing_slash {
                segments.push("");
            }
        }
        Ok(url)
    }
}

impl RemoteStore for HttpRemote {
    fn fetch_listing(&self, path: &str) -> Result<DirectoryListing, RemoteError> {
        let url = self.listing_url(path)?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send()?;
        let status = response.status();
        let body = response.bytes()?;

        // Newly created or transient directories come back with nothing at all.
        if body.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!("empty listing for {} ({})", path, status);
            return Ok(DirectoryListing::empty(path));
        }
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }

        Ok(serde_json::from_slice(&body)?)
    }

    fn fetch_blob(&self, path: &str) -> Result<Blob, RemoteError> {
        let url = self.blob_url(path)?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send()?;
        let status = response.status();
        let modified = last_modified(path, response.headers());
        let data = response.bytes()?.to_vec();

        if status != StatusCode::OK {
            return Err(RemoteError::NotFound(status));
        }

        Ok(Blob { data, modified })
    }

    fn put_blob(
        &self,
        path: &str,
        data: Vec<u8>,
        if_none_match: bool,
    ) -> Result<(), RemoteError> {
        let url = self.blob_url(path)?;
        tracing::debug!("PUT {} ({} bytes, exclusive={})", url, data.len(), if_none_match);

        let mut request = self.client.put(url).body(data);
        if if_none_match {
            request = request.header(IF_NONE_MATCH, "*");
        }
        let response = request.send()?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::PRECONDITION_FAILED if if_none_match => Err(RemoteError::Conflict),
            status => Err(RemoteError::Status(status)),
        }
    }

    fn delete_blob(&self, path: &str) -> Result<(), RemoteError> {
        let url = self.blob_url(path)?;
        tracing::debug!("DELETE {}", url);

        let response = self.client.delete(url).send()?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(RemoteError::Status(status)),
        }
    }
}

/// Parse `Last-Modified`. A bad value is logged and read as the epoch; it
/// never fails the request.
fn last_modified(path: &str, headers: &HeaderMap) -> SystemTime {
    let Some(value) = headers.get(LAST_MODIFIED) else {
        return SystemTime::UNIX_EPOCH;
    };
    let parsed = value
        .to_str()
        .map_err(|e| e.to_string())
        .and_then(|s| DateTime::parse_from_rfc2822(s).map_err(|e| e.to_string()));

    match parsed {
        Ok(t) => t.into(),
        Err(e) => {
            tracing::warn!("fetch_blob({:?}): bad Last-Modified: {}", path, e);
            SystemTime::UNIX_EPOCH
        }
    }
}
