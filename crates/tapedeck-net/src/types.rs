use std::time::Duration;

/// Inclusive-upper-bound HTTP byte range, per the `Range` header grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    #[must_use]
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Half-open `[offset, offset + length)` as an inclusive header range.
    ///
    /// `length` must be positive.
    #[must_use]
    pub fn from_offset_len(offset: u64, length: u64) -> Self {
        debug_assert!(length > 0);
        Self {
            start: offset,
            end: Some(offset + length - 1),
        }
    }

    #[must_use]
    pub fn to_header_value(&self) -> String {
        if let Some(end) = self.end {
            format!("bytes={}-{}", self.start, end)
        } else {
            format!("bytes={}-", self.start)
        }
    }
}

/// Strongest identifier the remote advertises for change detection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FileIdentifier {
    ETag(String),
    LastModified(String),
    #[default]
    None,
}

/// Result of probing a remote file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub size: u64,
    pub identifier: FileIdentifier,
}

#[derive(Clone, Debug)]
pub struct NetOptions {
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 2,
        }
    }
}
