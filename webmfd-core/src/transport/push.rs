//! WebSocket push channel
//!
//! One long-lived connection per session. A single driver task owns the
//! socket: it sends the initial label request on every (re)connect,
//! re-requests when the server answers with an empty frame, and
//! reconnects with the same key whenever the connection drops without a
//! preceding teardown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    CLOSE_TIMEOUT, ChannelEvent, ChannelState, HandlerSlot, MessageHandler, StateCell,
    TransportChannel,
};
use crate::config::{ServerEndpoint, TransportKind};
use crate::error::TransportError;
use crate::key::SessionKey;
use crate::protocol::{ButtonEvent, Payload, decode_payload, encode_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Frame asking the server for the current labels
const REFRESH_FRAME: &str = "-1";

/// Persistent WebSocket transport for one session
pub struct PushChannel {
    inner: Arc<PushInner>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct PushInner {
    key: SessionKey,
    url: Url,
    reconnect_delay: Duration,
    state: StateCell,
    handler: HandlerSlot,
    outgoing_tx: mpsc::UnboundedSender<String>,
    /// Set once the teardown code was sent; the next close is intentional
    tearing_down: AtomicBool,
    reconnects: AtomicU64,
    cancel: CancellationToken,
}

/// Why a single connection ended
enum Disconnect {
    /// Socket closed or failed; reconnect unless tearing down
    Dropped,
    /// Local close requested
    Cancelled,
}

impl PushChannel {
    /// Create a channel for `key`; nothing connects until [`open`](TransportChannel::open)
    pub fn new(
        key: SessionKey,
        endpoint: &ServerEndpoint,
        reconnect_delay: Duration,
    ) -> Result<Self, TransportError> {
        let url = endpoint.push_url(&key)?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(PushInner {
                key,
                url,
                reconnect_delay,
                state: StateCell::default(),
                handler: HandlerSlot::default(),
                outgoing_tx,
                tearing_down: AtomicBool::new(false),
                reconnects: AtomicU64::new(0),
                cancel: CancellationToken::new(),
            }),
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            driver: Mutex::new(None),
        })
    }

    /// WebSocket address this channel connects to
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Number of times the connection was re-established
    pub fn reconnect_count(&self) -> u64 {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Whether the teardown code has been sent
    pub fn is_tearing_down(&self) -> bool {
        self.inner.tearing_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportChannel for PushChannel {
    fn key(&self) -> &SessionKey {
        &self.inner.key
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    fn state(&self) -> ChannelState {
        self.inner.state.get()
    }

    fn is_live(&self) -> bool {
        !self.inner.stop_requested()
            && matches!(
                self.inner.state.get(),
                ChannelState::Connecting | ChannelState::Open
            )
    }

    async fn open(&self) -> Result<(), TransportError> {
        let rx = self.outgoing_rx.lock().ok().and_then(|mut rx| rx.take());
        let Some(rx) = rx else {
            debug!(key = %self.inner.key, "Push channel already opened");
            return Ok(());
        };
        if self.inner.stop_requested() {
            return Err(TransportError::Closed(self.inner.key.to_string()));
        }

        self.inner.state.set(ChannelState::Connecting);
        let handle = tokio::spawn(Arc::clone(&self.inner).run(rx));
        if let Ok(mut driver) = self.driver.lock() {
            *driver = Some(handle);
        }
        Ok(())
    }

    async fn send(&self, event: ButtonEvent) -> Result<(), TransportError> {
        let frame = encode_frame(event)?;
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::Closed(self.inner.key.to_string()));
        }
        if event == ButtonEvent::Teardown {
            self.inner.tearing_down.store(true, Ordering::SeqCst);
        }
        self.inner
            .outgoing_tx
            .send(frame)
            .map_err(|_| TransportError::Closed(self.inner.key.to_string()))
    }

    fn on_message(&self, handler: MessageHandler) {
        self.inner.handler.set(handler);
    }

    fn clear_handler(&self) {
        self.inner.handler.clear();
    }

    async fn close(&self) {
        self.inner.tearing_down.store(true, Ordering::SeqCst);
        if self.inner.state.get() != ChannelState::Closed {
            self.inner.state.set(ChannelState::Closing);
        }
        self.inner.cancel.cancel();

        let handle = self.driver.lock().ok().and_then(|mut driver| driver.take());
        if let Some(mut handle) = handle
            && tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err()
        {
            warn!(key = %self.inner.key, "Push channel did not stop in time, aborting");
            handle.abort();
        }
        self.inner.state.set(ChannelState::Closed);
    }
}

impl Drop for PushChannel {
    /// Stop the driver when the channel goes away without `close`
    fn drop(&mut self) {
        self.inner.tearing_down.store(true, Ordering::SeqCst);
        // The driver watches the token at every await, so a live
        // connection still gets its Close frame
        self.inner.cancel.cancel();
    }
}

impl PushInner {
    fn stop_requested(&self) -> bool {
        self.tearing_down.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    fn report_error(&self, error: TransportError) {
        warn!(key = %self.key, "{}", error);
        self.handler
            .dispatch(ChannelEvent::TransportError(error.to_string()));
    }

    /// Connect, serve, and reconnect until teardown or close
    async fn run(self: Arc<Self>, mut outgoing: mpsc::UnboundedReceiver<String>) {
        let mut first_attempt = true;

        while !self.stop_requested() {
            if !first_attempt {
                let attempt = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(key = %self.key, attempt, "Reconnecting push channel");
                if !self.reconnect_delay.is_zero() {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
            first_attempt = false;

            self.state.set(ChannelState::Connecting);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            let stream = match connected {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    self.state.set(ChannelState::Closed);
                    self.report_error(TransportError::Connect {
                        url: self.url.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            info!(key = %self.key, "Push channel connected");
            self.state.set(ChannelState::Open);
            let disconnect = self.serve(stream, &mut outgoing).await;
            self.state.set(ChannelState::Closed);

            match disconnect {
                Disconnect::Cancelled => break,
                Disconnect::Dropped if self.stop_requested() => {
                    debug!(key = %self.key, "Push channel closed after teardown");
                }
                Disconnect::Dropped => {
                    debug!(key = %self.key, "Push channel closed unexpectedly");
                }
            }
        }

        self.state.set(ChannelState::Closed);
        debug!(key = %self.key, "Push channel driver stopped");
    }

    /// Pump one connection until it drops or the channel is cancelled
    async fn serve(
        &self,
        stream: WsStream,
        outgoing: &mut mpsc::UnboundedReceiver<String>,
    ) -> Disconnect {
        let (mut sink, mut source) = stream.split();

        if let Err(e) = self.send_frame(&mut sink, REFRESH_FRAME.to_string()).await {
            self.report_error(e);
            return Disconnect::Dropped;
        }

        loop {
            // Queued frames go out before a pending close is honoured
            tokio::select! {
                biased;

                frame = outgoing.recv() => {
                    let Some(frame) = frame else {
                        return Disconnect::Cancelled;
                    };
                    if let Err(e) = self.send_frame(&mut sink, frame).await {
                        self.report_error(e);
                        return Disconnect::Dropped;
                    }
                }

                _ = self.cancel.cancelled() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(key = %self.key, "Close frame not delivered: {}", e);
                    }
                    return Disconnect::Cancelled;
                }

                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let text: &str = &text;
                        if let Err(e) = self.handle_text(text, &mut sink).await {
                            self.report_error(e);
                            return Disconnect::Dropped;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Disconnect::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite; binary frames are not part of the protocol
                    }
                    Some(Err(e)) => {
                        self.report_error(TransportError::Connection(e.to_string()));
                        return Disconnect::Dropped;
                    }
                },
            }
        }
    }

    async fn send_frame(&self, sink: &mut WsSink, frame: String) -> Result<(), TransportError> {
        debug!(key = %self.key, frame = %frame, "Sending push frame");
        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn handle_text(&self, text: &str, sink: &mut WsSink) -> Result<(), TransportError> {
        match decode_payload(text) {
            Ok(Payload::Labels(labels)) => {
                debug!(key = %self.key, "Received label set");
                self.handler.dispatch(ChannelEvent::Labels(labels));
                Ok(())
            }
            Ok(Payload::NotReady) => {
                debug!(key = %self.key, "Server not ready, re-requesting labels");
                self.send_frame(sink, REFRESH_FRAME.to_string()).await
            }
            Err(e) => {
                warn!(key = %self.key, "{}, re-requesting labels", e);
                self.send_frame(sink, REFRESH_FRAME.to_string()).await
            }
        }
    }
}
