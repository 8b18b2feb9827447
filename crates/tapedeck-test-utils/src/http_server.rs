//! Shared async HTTP test server helpers.
//!
//! [`range_router`] is the dev server the integration tests point fetchers
//! at: it serves one blob with `Accept-Ranges: bytes` and `206` slices.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use url::Url;

/// Lightweight HTTP test server wrapper.
pub struct TestHttpServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestHttpServer {
    /// Spawn `router` on a random localhost port.
    ///
    /// # Panics
    ///
    /// Panics if listener bind or URL parsing fails.
    pub async fn new(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test HTTP listener");
        let addr = listener
            .local_addr()
            .expect("read test listener local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });

        tokio::spawn(async move {
            server.await.expect("run test HTTP server");
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).expect("parse base URL"),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Join path to server base URL.
    ///
    /// # Panics
    ///
    /// Panics if URL join fails.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("join server URL path")
    }

    /// Base URL of this server.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Router serving `data` at `/file` with byte-range support.
#[must_use]
pub fn range_router(data: impl Into<Bytes>) -> Router {
    Router::new()
        .route("/file", get(serve_ranged))
        .with_state(data.into())
}

/// Router serving `data` at `/file` without `Accept-Ranges`, for probing
/// failure paths.
#[must_use]
pub fn plain_router(data: impl Into<Bytes>) -> Router {
    Router::new()
        .route("/file", get(serve_plain))
        .with_state(data.into())
}

async fn serve_plain(State(data): State<Bytes>) -> impl IntoResponse {
    ([(header::CONTENT_LENGTH, data.len().to_string())], data)
}

async fn serve_ranged(State(data): State<Bytes>, headers: HeaderMap) -> impl IntoResponse {
    let total = data.len() as u64;
    let common = [
        (header::ACCEPT_RANGES, "bytes".to_owned()),
        (header::ETAG, "\"tapedeck-test\"".to_owned()),
    ];

    let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::OK,
            common,
            [(header::CONTENT_LENGTH, total.to_string())],
            data,
        )
            .into_response();
    };

    let Some((start, end)) = parse_range(range, total) else {
        return (StatusCode::RANGE_NOT_SATISFIABLE, common).into_response();
    };

    let body = data.slice(start as usize..end as usize);
    (
        StatusCode::PARTIAL_CONTENT,
        common,
        [
            (header::CONTENT_LENGTH, body.len().to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {start}-{}/{total}", end - 1),
            ),
        ],
        body,
    )
        .into_response()
}

/// Parse `bytes=<start>-<end>` into a half-open `(start, end)` pair.
fn parse_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        total
    } else {
        end.parse::<u64>().ok()?.checked_add(1)?
    };
    (start < end && end <= total).then_some((start, end.min(total)))
}
