//! HTTP poll channel
//!
//! No persistent connection: every button event becomes one GET request
//! whose body carries the resulting labels. A worker task drains the
//! session's event queue in order, so a key never has two requests in
//! flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{
    CLOSE_TIMEOUT, ChannelEvent, ChannelState, HandlerSlot, MessageHandler, StateCell,
    TransportChannel,
};
use crate::config::{ServerEndpoint, TransportKind};
use crate::error::TransportError;
use crate::key::SessionKey;
use crate::protocol::{ButtonEvent, Payload, decode_payload, encode_path_code};

/// Request/response transport for one session
pub struct PollChannel {
    inner: Arc<PollInner>,
    queue_tx: Mutex<Option<mpsc::UnboundedSender<ButtonEvent>>>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<ButtonEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct PollInner {
    key: SessionKey,
    endpoint: ServerEndpoint,
    client: reqwest::Client,
    state: StateCell,
    handler: HandlerSlot,
    closed: AtomicBool,
    requests: AtomicU64,
}

impl PollChannel {
    pub fn new(key: SessionKey, endpoint: ServerEndpoint, client: reqwest::Client) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(PollInner {
                key,
                endpoint,
                client,
                state: StateCell::default(),
                handler: HandlerSlot::default(),
                closed: AtomicBool::new(false),
                requests: AtomicU64::new(0),
            }),
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Mutex::new(Some(queue_rx)),
            worker: Mutex::new(None),
        }
    }

    /// Number of HTTP requests issued so far, retries included
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportChannel for PollChannel {
    fn key(&self) -> &SessionKey {
        &self.inner.key
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Poll
    }

    fn state(&self) -> ChannelState {
        self.inner.state.get()
    }

    fn is_live(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.inner.key.to_string()));
        }
        let rx = self.queue_rx.lock().ok().and_then(|mut rx| rx.take());
        let Some(rx) = rx else {
            return Ok(());
        };

        self.inner.state.set(ChannelState::Open);
        let handle = tokio::spawn(Arc::clone(&self.inner).run(rx));
        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(handle);
        }
        Ok(())
    }

    async fn send(&self, event: ButtonEvent) -> Result<(), TransportError> {
        encode_path_code(event)?;
        let closed = || TransportError::Closed(self.inner.key.to_string());

        let queue = self.queue_tx.lock().map_err(|_| closed())?;
        let Some(tx) = queue.as_ref() else {
            return Err(closed());
        };
        tx.send(event).map_err(|_| closed())
    }

    fn on_message(&self, handler: MessageHandler) {
        self.inner.handler.set(handler);
    }

    fn clear_handler(&self) {
        self.inner.handler.clear();
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if self.inner.state.get() != ChannelState::Closed {
            self.inner.state.set(ChannelState::Closing);
        }

        // Dropping the sender lets the worker finish what is already queued
        if let Ok(mut queue) = self.queue_tx.lock() {
            queue.take();
        }
        if let Ok(mut rx) = self.queue_rx.lock() {
            rx.take();
        }

        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(mut handle) = handle
            && tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err()
        {
            warn!(key = %self.inner.key, "Poll channel did not stop in time, aborting");
            handle.abort();
        }
        self.inner.state.set(ChannelState::Closed);
    }
}

impl PollInner {
    async fn run(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<ButtonEvent>) {
        while let Some(event) = queue.recv().await {
            self.poll(event).await;
        }
        debug!(key = %self.key, "Poll channel worker stopped");
    }

    /// Issue one request for `event`, resending while the server reports a
    /// failure with a non-empty body
    async fn poll(&self, event: ButtonEvent) {
        let url = match self.endpoint.poll_url(event, &self.key) {
            Ok(url) => url,
            Err(e) => {
                warn!(key = %self.key, "{}", e);
                return;
            }
        };

        loop {
            self.requests.fetch_add(1, Ordering::SeqCst);
            debug!(key = %self.key, %event, "Issuing poll request");

            let response = match self.client.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    self.report_error(&url, e);
                    return;
                }
            };
            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    self.report_error(&url, e);
                    return;
                }
            };

            if !status.is_success() && !body.is_empty() {
                if self.closed.load(Ordering::SeqCst) {
                    debug!(key = %self.key, %status, "Channel closed, not resending");
                    return;
                }
                debug!(key = %self.key, %status, %event, "Poll request failed, resending");
                continue;
            }

            if body.is_empty() {
                trace!(key = %self.key, %status, "Empty poll response");
                return;
            }

            match decode_payload(&body) {
                Ok(Payload::Labels(labels)) => {
                    self.handler.dispatch(ChannelEvent::Labels(labels));
                }
                Ok(Payload::NotReady) => {
                    trace!(key = %self.key, "Blank poll response");
                }
                Err(e) => {
                    debug!(key = %self.key, "Ignoring poll response: {}", e);
                }
            }
            return;
        }
    }

    fn report_error(&self, url: &url::Url, error: reqwest::Error) {
        let error = TransportError::Request {
            url: url.to_string(),
            message: error.to_string(),
        };
        warn!(key = %self.key, "{}", error);
        self.handler
            .dispatch(ChannelEvent::TransportError(error.to_string()));
    }
}
