//! Shared test utilities for webmfd-core integration tests
//!
//! Note: Some helpers may appear unused because each test file compiles
//! this module independently.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use webmfd_core::{ChannelEvent, MessageHandler, PanelWidget};

pub const LABELS_A: &str =
    r#"{"left":["1","2","3","4","5","6"],"right":["7","8","9","10","11","12"]}"#;
pub const LABELS_B: &str = r#"{"left":["NAV","ADI","HSI","VOR","ILS","DCK"],"right":["MFD","","","","","OFF"]}"#;

/// How long a test waits for something that should happen
pub const WAIT: Duration = Duration::from_secs(5);

/// How long a test waits to be confident something does not happen
pub const QUIET: Duration = Duration::from_millis(300);

// ==================== Widget ====================

/// Panel widget recording what the session does to it
#[derive(Default)]
pub struct RecordingWidget {
    labels: Mutex<Vec<String>>,
    updates: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl RecordingWidget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            labels: Mutex::new(vec![".".to_string(); 12]),
            ..Default::default()
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }

    /// Number of individual slot updates applied
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl PanelWidget for RecordingWidget {
    fn set_button_label(&self, slot: usize, text: &str) {
        self.labels.lock().unwrap()[slot] = text.to_string();
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

pub fn weak(widget: &Arc<RecordingWidget>) -> Weak<dyn PanelWidget> {
    let widget: Arc<dyn PanelWidget> = widget.clone();
    Arc::downgrade(&widget)
}

/// Handler forwarding channel events into a receiver
pub fn event_handler() -> (MessageHandler, mpsc::UnboundedReceiver<ChannelEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: MessageHandler = Arc::new(move |event: ChannelEvent| {
        let _ = tx.send(event);
    });
    (handler, rx)
}

/// Next label event, skipping transport errors
pub async fn next_labels(
    events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
) -> webmfd_core::LabelSet {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(ChannelEvent::Labels(labels)) => return labels,
                Some(ChannelEvent::TransportError(_)) => continue,
                None => panic!("Event channel closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for labels")
}

/// Poll `condition` until it holds or `WAIT` elapses
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ==================== Push server ====================

/// One accepted WebSocket connection on the test push server
pub struct PushConn {
    /// Query string of the upgrade request
    pub query: String,
    ws: WebSocketStream<TcpStream>,
}

impl PushConn {
    /// Next text frame, or `None` once the client closed the connection
    pub async fn recv_frame(&mut self) -> Option<String> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Next text frame within `WAIT`, panicking otherwise
    pub async fn expect_frame(&mut self) -> String {
        tokio::time::timeout(WAIT, self.recv_frame())
            .await
            .expect("Timed out waiting for frame")
            .expect("Connection closed while waiting for frame")
    }

    /// Whatever arrives within `QUIET`: `Ok(frame)`, `Err(true)` if closed,
    /// `Err(false)` if nothing happened
    pub async fn recv_quiet(&mut self) -> Result<String, bool> {
        match tokio::time::timeout(QUIET, self.recv_frame()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(true),
            Err(_) => Err(false),
        }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Close the connection from the server side
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        // Drain until the client acknowledges
        while let Some(Ok(_)) = self.ws.next().await {}
    }
}

/// Spawns a WebSocket server yielding each accepted connection
pub async fn spawn_push_server() -> (SocketAddr, mpsc::UnboundedReceiver<PushConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let mut query = String::new();
            let accepted = accept_hdr_async(
                stream,
                |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    query = req.uri().query().unwrap_or_default().to_string();
                    Ok(resp)
                },
            )
            .await;
            if let Ok(ws) = accepted
                && tx.send(PushConn { query, ws }).is_err()
            {
                break;
            }
        }
    });

    (addr, rx)
}

/// Next connection accepted by the push server within `WAIT`
pub async fn accept(conns: &mut mpsc::UnboundedReceiver<PushConn>) -> PushConn {
    tokio::time::timeout(WAIT, conns.recv())
        .await
        .expect("Timed out waiting for connection")
        .expect("Push server stopped")
}

/// Whether the push server accepts another connection within `QUIET`
pub async fn connects_again(conns: &mut mpsc::UnboundedReceiver<PushConn>) -> bool {
    tokio::time::timeout(QUIET, conns.recv()).await.is_ok()
}

// ==================== Poll server ====================

/// Scripted HTTP server for the poll endpoint
pub struct PollServer {
    replies: Mutex<VecDeque<(StatusCode, String)>>,
    fallback: Mutex<(StatusCode, String)>,
    requests: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Duration>,
}

impl PollServer {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new((StatusCode::OK, String::new())),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Queue the reply for the next request
    pub fn reply(&self, status: StatusCode, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    /// Reply used once the scripted replies run out
    pub fn set_fallback(&self, status: StatusCode, body: &str) {
        *self.fallback.lock().unwrap() = (status, body.to_string());
    }

    /// Delay every reply by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// (code, key) of every request received, in arrival order
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn btn_h(
    State(server): State<Arc<PollServer>>,
    Path(code): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let now = server.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    server.max_in_flight.fetch_max(now, Ordering::SeqCst);
    server
        .requests
        .lock()
        .unwrap()
        .push((code, query.get("key").cloned().unwrap_or_default()));

    let delay = *server.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let scripted = server.replies.lock().unwrap().pop_front();
    let reply = scripted.unwrap_or_else(|| server.fallback.lock().unwrap().clone());
    server.in_flight.fetch_sub(1, Ordering::SeqCst);
    reply
}

/// Spawns the scripted poll server
pub async fn spawn_poll_server() -> (SocketAddr, Arc<PollServer>) {
    let server = Arc::new(PollServer::new());
    let app = Router::new()
        .route("/btn_h/:code", get(btn_h))
        .with_state(Arc::clone(&server));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, server)
}
