#![allow(dead_code)]

use std::{
    collections::{HashSet, VecDeque},
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
pub struct MockResponse {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl MockResponse {
    pub fn json(status: StatusCode, body: JsonValue) -> Self {
        Self::text(status, &body.to_string())
    }

    pub fn text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
            delay: Duration::from_millis(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    hits: Arc<AtomicUsize>,
    post_hits: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockState {
    fn record_peer(&self, peer: SocketAddr) {
        self.peers
            .lock()
            .expect("peer set mutex must not be poisoned")
            .insert(peer);
    }

    fn record_request(&self, path: &str) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.paths
            .lock()
            .expect("path log mutex must not be poisoned")
            .push(path.to_owned());
    }

    fn next_queued(&self) -> Option<MockResponse> {
        self.responses
            .lock()
            .expect("response queue mutex must not be poisoned")
            .pop_front()
    }
}

impl MockResponse {
    async fn send(self) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.status, self.body).into_response()
    }
}

/// Counts a request as in flight until dropped.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            current: &state.in_flight,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves `/posts/:id` from the response queue while it has entries, then
/// with a generated post; id 0 does not exist.
///
/// Completion order is scrambled with a small per-id delay.
async fn post_handler(
    State(state): State<MockState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<u32>,
    uri: Uri,
) -> Response {
    state.post_hits.fetch_add(1, Ordering::SeqCst);
    state.record_peer(peer);
    let _in_flight = InFlight::enter(&state);

    if let Some(queued) = state.next_queued() {
        state.record_request(uri.path());
        return queued.send().await;
    }

    tokio::time::sleep(Duration::from_millis(5 + u64::from(id % 7))).await;

    if id == 0 {
        return (StatusCode::NOT_FOUND, Json(json!({}))).into_response();
    }
    (
        StatusCode::OK,
        Json(json!({ "id": id, "title": format!("post {id}") })),
    )
        .into_response()
}

/// Answers every other path from the response queue, or echoes the request
/// once the queue is empty.
async fn queued_handler(
    State(state): State<MockState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.record_peer(peer);
    state.record_request(uri.path());

    let response = state.next_queued().unwrap_or_else(|| {
        let header_text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        MockResponse::json(
            StatusCode::OK,
            json!({
                "method": method.as_str(),
                "path": uri.path(),
                "body": body,
                "content_type": header_text(header::CONTENT_TYPE.as_str()),
                "api_key": header_text("x-api-key"),
            }),
        )
    });

    response.send().await
}

pub struct TestServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    post_hits: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
    peak_in_flight: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    /// Requests answered from the response queue or by the echo fallback.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Requests answered by `/posts/:id`.
    pub fn post_hits(&self) -> usize {
        self.post_hits.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .expect("path log mutex must not be poisoned")
            .clone()
    }

    /// Most `/posts/:id` requests the server handled at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Distinct client sockets seen, i.e. TCP connections opened.
    pub fn connections(&self) -> usize {
        self.peers
            .lock()
            .expect("peer set mutex must not be poisoned")
            .len()
    }
}

pub async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
        post_hits: Arc::new(AtomicUsize::new(0)),
        paths: Arc::new(Mutex::new(Vec::new())),
        peers: Arc::new(Mutex::new(HashSet::new())),
        in_flight: Arc::new(AtomicUsize::new(0)),
        peak_in_flight: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/posts/:id", get(post_handler))
        .fallback(queued_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        post_hits: state.post_hits,
        paths: state.paths,
        peers: state.peers,
        peak_in_flight: state.peak_in_flight,
        task,
    }
}

/// Address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);
    format!("http://{address}")
}
