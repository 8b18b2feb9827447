use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, ETAG, LAST_MODIFIED, RANGE};
use tracing::debug;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteStream, RangedFetch},
    types::{FileIdentifier, NetOptions, RangeSpec, RemoteFile},
};

/// [`RangedFetch`] over HTTP ranged GET.
///
/// `open` issues a GET and aborts it before consuming the body, using only
/// the response headers; `fetch` issues `Range: bytes=<start>-<end>` requests
/// and expects `206 Partial Content`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    inner: Client,
    url: Url,
    options: NetOptions,
}

impl HttpFetcher {
    /// Build a fetcher for `url`.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized.
    #[must_use]
    pub fn new(url: Url, options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .connect_timeout(options.request_timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            inner,
            url,
            options,
        }
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RangedFetch for HttpFetcher {
    async fn open(&self) -> NetResult<RemoteFile> {
        let resp = self
            .inner
            .get(self.url.clone())
            .header(CACHE_CONTROL, "no-store")
            .timeout(self.options.request_timeout)
            .send()
            .await
            .map_err(NetError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let headers = resp.headers();
        let accepts_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
        if !accepts_ranges {
            return Err(NetError::RangesNotSupported {
                url: self.url.clone(),
            });
        }

        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&len| len > 0)
            .ok_or_else(|| NetError::MissingContentLength {
                url: self.url.clone(),
            })?;

        let identifier = if let Some(etag) = headers.get(ETAG).and_then(|v| v.to_str().ok()) {
            FileIdentifier::ETag(etag.to_owned())
        } else if let Some(modified) = headers.get(LAST_MODIFIED).and_then(|v| v.to_str().ok()) {
            FileIdentifier::LastModified(modified.to_owned())
        } else {
            FileIdentifier::None
        };

        debug!(url = %self.url, size, ?identifier, "probed remote file");

        // Drop the response without reading the body: the probe only needs
        // headers, and the connection abort stops any in-flight transfer.
        drop(resp);

        Ok(RemoteFile { size, identifier })
    }

    async fn fetch(&self, offset: u64, length: u64) -> NetResult<ByteStream> {
        if length == 0 || offset.checked_add(length).is_none() {
            return Err(NetError::InvalidFetchRange { offset, length });
        }

        let range = RangeSpec::from_offset_len(offset, length);
        debug!(url = %self.url, range = %range.to_header_value(), "opening ranged stream");

        let resp = self
            .inner
            .get(self.url.clone())
            // No per-request timeout here: a ranged stream is expected to
            // stay open for as long as the cache keeps draining it.
            .header(RANGE, range.to_header_value())
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(NetError::from)?;

        let status = resp.status();
        if status.as_u16() != 206 {
            return Err(NetError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }
}
