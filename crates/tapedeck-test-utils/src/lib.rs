#![forbid(unsafe_code)]

//! Shared test helpers for the tapedeck workspace.

mod http_server;

pub use http_server::{TestHttpServer, plain_router, range_router};

/// Initialize tracing for a test binary. Safe to call more than once.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
