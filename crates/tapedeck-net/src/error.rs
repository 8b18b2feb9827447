use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Centralized error type for tapedeck-net.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: Url, status: u16 },

    #[error("{url} does not advertise `Accept-Ranges: bytes`")]
    RangesNotSupported { url: Url },

    #[error("{url} reported no usable Content-Length")]
    MissingContentLength { url: Url },

    #[error("invalid fetch range: offset {offset}, length {length}")]
    InvalidFetchRange { offset: u64, length: u64 },

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        // Alternate formatting keeps the full source chain
        // ("error sending request ...: connection refused").
        Self::Http(format!("{e:#}"))
    }
}
