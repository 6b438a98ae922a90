//! Transfer engine tests against an in-process HTTP server
//!
//! The server honors byte ranges conditionally on If-Range, like a real
//! origin: a matching validator gets 206 from the requested offset, a
//! stale one gets 200 with the full body.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use depot::progress::{NullSink, ProgressSink, ProgressUpdate};
use depot::transfer::{sidecar_path, transfer, Sidecar, TransferOptions};
use depot::DepotError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const TEST_SIZE: usize = 256 * 1024;

struct ServerState {
    body: Vec<u8>,
    etag: String,
    requests: AtomicUsize,
    ranges: Mutex<Vec<Option<String>>>,
}

impl ServerState {
    fn new(etag: &str) -> Self {
        Self {
            body: (0..TEST_SIZE).map(|i| (i % 251) as u8).collect(),
            etag: etag.to_string(),
            requests: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn parse_range_start(value: &str) -> Option<u64> {
    value
        .strip_prefix("bytes=")?
        .split('-')
        .next()?
        .parse()
        .ok()
}

async fn serve_file(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let range = req
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.ranges.lock().unwrap().push(range.clone());

    let if_range_ok = req
        .headers()
        .get(header::IF_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == state.etag)
        .unwrap_or(true);

    let total = state.body.len() as u64;

    if let (Some(range), true) = (range, if_range_ok) {
        if let Some(start) = parse_range_start(&range) {
            let start = start.min(total);
            let slice = state.body[start as usize..].to_vec();
            return (
                StatusCode::PARTIAL_CONTENT,
                [
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, total - 1, total),
                    ),
                    (header::CONTENT_LENGTH, slice.len().to_string()),
                    (header::ETAG, state.etag.clone()),
                ],
                slice,
            )
                .into_response();
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_LENGTH, total.to_string()),
            (header::ETAG, state.etag.clone()),
        ],
        state.body.clone(),
    )
        .into_response()
}

/// First 4 KB immediately, then a stall far longer than any test runs.
async fn serve_slow(State(state): State<Arc<ServerState>>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let head = state.body[..4096].to_vec();
    let total = state.body.len();

    let stream = futures_util::stream::unfold(0u8, move |step| {
        let head = head.clone();
        async move {
            match step {
                0 => Some((Ok::<_, std::io::Error>(head), 1)),
                _ => {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    None
                }
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, total.to_string())
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn start_server(state: Arc<ServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/bundle.bin", get(serve_file))
        .route("/slow.bin", get(serve_slow))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fast_opts() -> TransferOptions {
    TransferOptions {
        progress_interval: Duration::from_millis(0),
        ..TransferOptions::default()
    }
}

#[tokio::test]
async fn fresh_download_completes_and_clears_sidecar() {
    let state = Arc::new(ServerState::new("\"v1\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundle.bin");

    let url = format!("http://{addr}/bundle.bin");
    transfer(&url, &dest, &NullSink, &fast_opts()).await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), state.body);
    assert!(!sidecar_path(&dest).exists());
}

#[tokio::test]
async fn resume_transfers_only_remaining_bytes() {
    let state = Arc::new(ServerState::new("\"v1\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundle.bin");
    let url = format!("http://{addr}/bundle.bin");

    // A crashed transfer left the first 100 KB and its marker behind.
    let offset = 100 * 1024;
    std::fs::write(&dest, &state.body[..offset]).unwrap();
    Sidecar::new(&url, Some(TEST_SIZE as u64), Some("\"v1\"".to_string()))
        .write(&dest)
        .unwrap();

    transfer(&url, &dest, &NullSink, &fast_opts()).await.unwrap();

    // Byte-identical to a fresh download, via a single ranged request.
    assert_eq!(std::fs::read(&dest).unwrap(), state.body);
    assert!(!sidecar_path(&dest).exists());
    let ranges = state.ranges.lock().unwrap();
    assert_eq!(ranges.as_slice(), [Some(format!("bytes={offset}-"))]);
}

#[tokio::test]
async fn changed_validator_restarts_from_zero() {
    let state = Arc::new(ServerState::new("\"v2\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundle.bin");
    let url = format!("http://{addr}/bundle.bin");

    // Stale partial with garbage content and an outdated validator.
    std::fs::write(&dest, vec![0xFFu8; 50 * 1024]).unwrap();
    Sidecar::new(&url, Some(TEST_SIZE as u64), Some("\"v1\"".to_string()))
        .write(&dest)
        .unwrap();

    transfer(&url, &dest, &NullSink, &fast_opts()).await.unwrap();

    // Never an append onto stale bytes.
    assert_eq!(std::fs::read(&dest).unwrap(), state.body);
    assert!(!sidecar_path(&dest).exists());
}

#[tokio::test]
async fn declared_size_conflict_fails_before_writing() {
    let state = Arc::new(ServerState::new("\"v1\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundle.bin");

    let opts = TransferOptions {
        expected_size: Some(TEST_SIZE as u64 + 5),
        ..fast_opts()
    };
    let url = format!("http://{addr}/bundle.bin");
    let err = transfer(&url, &dest, &NullSink, &opts).await.unwrap_err();

    assert!(matches!(err, DepotError::Validation(_)));
    assert!(!dest.exists());
    assert!(!sidecar_path(&dest).exists());
}

#[tokio::test]
async fn complete_destination_is_not_refetched() {
    let state = Arc::new(ServerState::new("\"v1\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundle.bin");

    std::fs::write(&dest, &state.body).unwrap();

    let url = format!("http://{addr}/bundle.bin");
    transfer(&url, &dest, &NullSink, &fast_opts()).await.unwrap();

    assert_eq!(state.request_count(), 0);
}

/// Sink that fires a cancellation once it has seen some bytes
struct CancelAfter {
    token: tokio_util::sync::CancellationToken,
    threshold: u64,
}

impl ProgressSink for CancelAfter {
    fn report(&self, update: ProgressUpdate) {
        if update.bytes_done.unwrap_or(0) >= self.threshold {
            self.token.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_preserves_partial_and_marker() {
    let state = Arc::new(ServerState::new("\"v1\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.bin");
    let url = format!("http://{addr}/slow.bin");

    let opts = fast_opts();
    let sink = CancelAfter {
        token: opts.cancel.clone(),
        threshold: 1,
    };

    let err = transfer(&url, &dest, &sink, &opts).await.unwrap_err();
    assert!(matches!(err, DepotError::Cancelled));

    // Both halves of the resumable state survive, consistently paired.
    assert!(dest.exists());
    let marker = Sidecar::load(&dest).unwrap().unwrap();
    assert_eq!(marker.url, url);
    assert_eq!(marker.expected_size, Some(TEST_SIZE as u64));
}

#[tokio::test]
async fn cancel_after_completion_is_a_noop() {
    let state = Arc::new(ServerState::new("\"v1\""));
    let addr = start_server(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundle.bin");

    let url = format!("http://{addr}/bundle.bin");
    let opts = fast_opts();
    transfer(&url, &dest, &NullSink, &opts).await.unwrap();

    // Idempotent: triggering the token after the fact changes nothing.
    opts.cancel.cancel();
    assert_eq!(std::fs::read(&dest).unwrap(), state.body);
    assert!(!sidecar_path(&dest).exists());
}
