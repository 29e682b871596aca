use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed listing: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("root URL {0} cannot carry a path")]
    InvalidRoot(url::Url),
    #[error("blob not found ({0})")]
    NotFound(StatusCode),
    #[error("resource already exists")]
    Conflict,
    #[error("unexpected status: {0}")]
    Status(StatusCode),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}
