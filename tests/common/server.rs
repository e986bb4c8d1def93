//! In-process stand-ins for the remote services.
//!
//! Each test spawns its own server on a random port; it shuts down when the
//! [`StubServer`] is dropped.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Canned responses and request records.
#[derive(Default)]
pub struct StubState {
    /// Status and body of `GET /links`.
    pub lookup: Option<(u16, String)>,
    /// Status and body of `GET /convert`.
    pub convert: Option<(u16, String)>,
    /// Bodies served at `GET /files/{name}`.
    pub files: HashMap<String, Vec<u8>>,
    /// Bodies served at `GET /catalog/{kind}/{id}`, keyed by `kind/id`.
    pub catalog: HashMap<String, String>,

    pub lookup_hits: AtomicUsize,
    pub convert_hits: AtomicUsize,
    pub lookup_queries: Mutex<Vec<String>>,
    pub convert_queries: Mutex<Vec<String>>,
}

impl StubState {
    pub fn lookup_hits(&self) -> usize {
        self.lookup_hits.load(Ordering::SeqCst)
    }

    pub fn convert_hits(&self) -> usize {
        self.convert_hits.load(Ordering::SeqCst)
    }

    pub fn last_lookup_query(&self) -> Option<String> {
        self.lookup_queries.lock().unwrap().last().cloned()
    }

    pub fn last_convert_query(&self) -> Option<String> {
        self.convert_queries.lock().unwrap().last().cloned()
    }
}

fn canned(response: &Option<(u16, String)>) -> Response {
    match response {
        Some((status, body)) => (
            StatusCode::from_u16(*status).unwrap(),
            [("content-type", "application/json")],
            body.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn links(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.lookup_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(url) = params.get("url") {
        state.lookup_queries.lock().unwrap().push(url.clone());
    }
    canned(&state.lookup)
}

async fn convert(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.convert_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(url) = params.get("url") {
        state.convert_queries.lock().unwrap().push(url.clone());
    }
    canned(&state.convert)
}

async fn file(State(state): State<Arc<StubState>>, Path(name): Path<String>) -> Response {
    match state.files.get(&name) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn catalog(
    State(state): State<Arc<StubState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    match state.catalog.get(&format!("{}/{}", kind, id)) {
        Some(body) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            body.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub struct StubServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    pub state: Arc<StubState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl StubServer {
    /// Bind a random port, build the state (which may refer to the base URL)
    /// and serve it in a background task.
    pub async fn spawn<F>(build: F) -> Self
    where
        F: FnOnce(&str) -> StubState,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = Arc::new(build(&base_url));
        let app = Router::new()
            .route("/links", get(links))
            .route("/convert", get(convert))
            .route("/files/{name}", get(file))
            .route("/catalog/{kind}/{id}", get(catalog))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url,
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
