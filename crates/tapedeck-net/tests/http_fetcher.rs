use futures::StreamExt;
use tapedeck_net::{FileIdentifier, HttpFetcher, NetError, NetOptions, RangedFetch};
use tapedeck_test_utils::{TestHttpServer, plain_router, range_router};

fn test_blob() -> Vec<u8> {
    (0..2048u32).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn open_probes_size_and_identifier() {
    let server = TestHttpServer::new(range_router(test_blob())).await;
    let fetcher = HttpFetcher::new(server.url("/file"), NetOptions::default());

    let remote = fetcher.open().await.unwrap();
    assert_eq!(remote.size, 2048);
    assert_eq!(
        remote.identifier,
        FileIdentifier::ETag("\"tapedeck-test\"".to_owned())
    );
}

#[tokio::test]
async fn open_rejects_server_without_range_support() {
    let server = TestHttpServer::new(plain_router(test_blob())).await;
    let fetcher = HttpFetcher::new(server.url("/file"), NetOptions::default());

    assert!(matches!(
        fetcher.open().await,
        Err(NetError::RangesNotSupported { .. })
    ));
}

#[tokio::test]
async fn open_rejects_missing_file() {
    let server = TestHttpServer::new(range_router(test_blob())).await;
    let fetcher = HttpFetcher::new(server.url("/nope"), NetOptions::default());

    assert!(matches!(
        fetcher.open().await,
        Err(NetError::HttpStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn fetch_streams_exact_range() {
    let blob = test_blob();
    let server = TestHttpServer::new(range_router(blob.clone())).await;
    let fetcher = HttpFetcher::new(server.url("/file"), NetOptions::default());

    let mut stream = fetcher.fetch(100, 500).await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(out, blob[100..600]);
}

#[tokio::test]
async fn fetch_past_end_is_an_http_error() {
    let server = TestHttpServer::new(range_router(test_blob())).await;
    let fetcher = HttpFetcher::new(server.url("/file"), NetOptions::default());

    assert!(matches!(
        fetcher.fetch(4096, 100).await,
        Err(NetError::HttpStatus { status: 416, .. })
    ));
}

#[tokio::test]
async fn zero_length_fetch_is_rejected_locally() {
    let server = TestHttpServer::new(range_router(test_blob())).await;
    let fetcher = HttpFetcher::new(server.url("/file"), NetOptions::default());

    assert!(matches!(
        fetcher.fetch(0, 0).await,
        Err(NetError::InvalidFetchRange { .. })
    ));
}
