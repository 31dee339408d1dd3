//! SessionController: opens, drives and tears down panel sessions
//!
//! The controller ties the other pieces together. `open` allocates a key,
//! registers the session, wires the channel's handler to the widget and
//! starts the channel. `press` forwards a button, `close` sends the
//! teardown notification and releases the key.

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, trace};
use url::Url;

use crate::config::{PanelConfig, TransportKind};
use crate::error::SessionError;
use crate::key::{KeyAllocator, SessionKey};
use crate::protocol::{ButtonEvent, LabelSet};
use crate::transport::{ChannelEvent, MessageHandler, build_channel};
use crate::widget::PanelWidget;

use super::registry::{SessionRegistry, SessionState};

/// Predicate for identifiers the host already uses outside the registry
pub type ReservedIds = Arc<dyn Fn(&SessionKey) -> bool + Send + Sync>;

/// Orchestrates the sessions of every panel a host opens
pub struct SessionController {
    config: PanelConfig,
    registry: Arc<SessionRegistry>,
    allocator: Mutex<KeyAllocator>,
    reserved: Option<ReservedIds>,
    client: reqwest::Client,
}

impl SessionController {
    pub fn new(config: PanelConfig, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            registry,
            allocator: Mutex::new(KeyAllocator::new()),
            reserved: None,
            client: reqwest::Client::new(),
        }
    }

    /// Use a specific key allocator (for tests)
    pub fn with_allocator(mut self, allocator: KeyAllocator) -> Self {
        self.allocator = Mutex::new(allocator);
        self
    }

    /// Also avoid identifiers for which `reserved` returns true
    pub fn with_reserved_ids(mut self, reserved: ReservedIds) -> Self {
        self.reserved = Some(reserved);
        self
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a session for `widget` and request its initial labels
    pub async fn open(&self, widget: Weak<dyn PanelWidget>) -> Result<SessionKey, SessionError> {
        let session = loop {
            let key = self.allocate_key();
            let channel = build_channel(&self.config, key.clone(), &self.client)?;
            match self.registry.register(key, widget.clone(), channel) {
                Ok(session) => break session,
                // Lost a race with a concurrent registration; draw again
                Err(SessionError::DuplicateKey(key)) => {
                    debug!(key = %key, "Key registered concurrently, resampling");
                }
                Err(e) => return Err(e),
            }
        };

        let key = session.key().clone();
        let channel = Arc::clone(session.channel());
        channel.on_message(self.label_handler(key.clone()));

        if let Err(e) = channel.open().await {
            self.registry.remove(&key);
            return Err(e.into());
        }
        // The push channel requests labels itself on every connect
        if self.config.transport == TransportKind::Poll
            && let Err(e) = channel.send(ButtonEvent::Refresh).await
        {
            self.release(&key).await;
            return Err(e.into());
        }

        info!(key = %key, transport = %self.config.transport, "Opened panel session");
        Ok(key)
    }

    /// Forward a button press to the server
    ///
    /// PWR never reaches the server: it closes the session locally.
    pub async fn press(&self, key: &SessionKey, event: ButtonEvent) -> Result<(), SessionError> {
        let session = self
            .registry
            .lookup(key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;

        match event {
            ButtonEvent::Power | ButtonEvent::Teardown => {
                self.close(key).await;
                Ok(())
            }
            _ => {
                debug!(key = %key, %event, "Forwarding button press");
                session.channel().send(event).await?;
                Ok(())
            }
        }
    }

    /// Tear a session down; closing an unknown key is a no-op
    pub async fn close(&self, key: &SessionKey) {
        let Some(session) = self.registry.lookup(key) else {
            trace!(key = %key, "Close for unknown session ignored");
            return;
        };
        if !session.begin_teardown() {
            trace!(key = %key, "Session already closing");
            return;
        }

        let channel = session.channel();
        if channel.is_live()
            && let Err(e) = channel.send(ButtonEvent::Teardown).await
        {
            debug!(key = %key, "Teardown not delivered: {}", e);
        }
        self.release(key).await;
        info!(key = %key, "Closed panel session");
    }

    /// Close every open session
    pub async fn close_all(&self) {
        for key in self.registry.keys() {
            self.close(&key).await;
        }
    }

    /// Keys of the sessions currently open
    pub fn sessions(&self) -> Vec<SessionKey> {
        self.registry.keys()
    }

    /// Address of the bitmap stream shown inside the panel for `key`
    pub fn image_url(&self, key: &SessionKey, force: bool) -> Result<Url, SessionError> {
        Ok(self
            .config
            .endpoint
            .image_url(key, self.config.image_format, force)?)
    }

    fn allocate_key(&self) -> SessionKey {
        let mut allocator = self
            .allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        allocator.allocate(|candidate| {
            self.registry.contains(candidate)
                || self.reserved.as_ref().is_some_and(|reserved| reserved(candidate))
        })
    }

    /// Detach, close and unregister
    async fn release(&self, key: &SessionKey) {
        if let Some(session) = self.registry.lookup(key) {
            let channel = session.channel();
            channel.clear_handler();
            channel.close().await;
        }
        self.registry.remove(key);
    }

    /// Handler applying channel events to the session's widget
    ///
    /// Looks the session up on every event, so events arriving after the
    /// session left the registry are dropped.
    fn label_handler(&self, key: SessionKey) -> MessageHandler {
        let registry = Arc::downgrade(&self.registry);
        Arc::new(move |event: ChannelEvent| {
            let Some(session) = registry.upgrade().and_then(|r| r.lookup(&key)) else {
                trace!(key = %key, "Event for closed session ignored");
                return;
            };
            if session.state() != SessionState::Active {
                return;
            }
            let Some(widget) = session.widget() else {
                trace!(key = %key, "Widget dropped, event ignored");
                return;
            };
            match event {
                ChannelEvent::Labels(labels) => apply_labels(widget.as_ref(), &labels),
                ChannelEvent::TransportError(message) => widget.notify_error(&message),
            }
        })
    }
}

/// Copy a label set onto the widget's twelve soft keys, left column first
pub fn apply_labels(widget: &dyn PanelWidget, labels: &LabelSet) {
    for (slot, text) in labels.slots() {
        widget.set_button_label(slot, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerEndpoint;
    use crate::transport::ChannelState;

    #[derive(Default)]
    struct RecordingWidget {
        labels: Mutex<Vec<(usize, String)>>,
        errors: Mutex<Vec<String>>,
    }

    impl PanelWidget for RecordingWidget {
        fn set_button_label(&self, slot: usize, text: &str) {
            self.labels.lock().unwrap().push((slot, text.to_string()));
        }

        fn notify_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    fn weak(widget: &Arc<RecordingWidget>) -> Weak<dyn PanelWidget> {
        let widget: Arc<dyn PanelWidget> = widget.clone();
        Arc::downgrade(&widget)
    }

    /// Poll controller pointed at a port nothing listens on
    fn unreachable_poll_controller() -> SessionController {
        let config = PanelConfig::poll(ServerEndpoint::new("127.0.0.1", 9));
        SessionController::new(config, Arc::new(SessionRegistry::new()))
    }

    fn labels() -> LabelSet {
        LabelSet {
            left: ["1", "2", "3", "4", "5", "6"].map(String::from),
            right: ["7", "8", "9", "10", "11", "12"].map(String::from),
        }
    }

    #[test]
    fn apply_labels_fills_left_then_right() {
        let widget = RecordingWidget::default();
        apply_labels(&widget, &labels());

        let applied = widget.labels.lock().unwrap().clone();
        assert_eq!(applied.len(), 12);
        for (i, (slot, text)) in applied.into_iter().enumerate() {
            assert_eq!(slot, i);
            assert_eq!(text, (i + 1).to_string());
        }
    }

    #[tokio::test]
    async fn open_registers_session() {
        let controller = unreachable_poll_controller();
        let widget = Arc::new(RecordingWidget::default());

        let key = controller.open(weak(&widget)).await.unwrap();

        assert_eq!(controller.sessions(), vec![key.clone()]);
        let session = controller.registry().lookup(&key).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.channel().state(), ChannelState::Open);

        controller.close(&key).await;
    }

    #[tokio::test]
    async fn open_avoids_reserved_ids() {
        let taken = KeyAllocator::seeded(3).candidate();
        let reserved = taken.clone();
        let controller = unreachable_poll_controller()
            .with_allocator(KeyAllocator::seeded(3))
            .with_reserved_ids(Arc::new(move |k: &SessionKey| *k == reserved));
        let widget = Arc::new(RecordingWidget::default());

        let key = controller.open(weak(&widget)).await.unwrap();

        assert_ne!(key, taken);
        controller.close(&key).await;
    }

    #[tokio::test]
    async fn open_sessions_get_distinct_keys() {
        let controller = unreachable_poll_controller();
        let widget = Arc::new(RecordingWidget::default());

        let mut keys = Vec::new();
        for _ in 0..5 {
            keys.push(controller.open(weak(&widget)).await.unwrap());
        }
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();

        assert_eq!(unique.len(), 5);
        controller.close_all().await;
        assert!(controller.sessions().is_empty());
    }

    #[tokio::test]
    async fn close_removes_session_and_is_idempotent() {
        let controller = unreachable_poll_controller();
        let widget = Arc::new(RecordingWidget::default());
        let key = controller.open(weak(&widget)).await.unwrap();
        let channel = Arc::clone(controller.registry().lookup(&key).unwrap().channel());

        controller.close(&key).await;
        controller.close(&key).await;

        assert!(controller.registry().lookup(&key).is_none());
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_close_tears_down_once() {
        let controller = Arc::new(unreachable_poll_controller());
        let widget = Arc::new(RecordingWidget::default());
        let key = controller.open(weak(&widget)).await.unwrap();
        let session = controller.registry().lookup(&key).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let key = key.clone();
                tokio::spawn(async move { controller.close(&key).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!session.begin_teardown());
        assert!(controller.registry().lookup(&key).is_none());
        assert_eq!(session.channel().state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn press_unknown_session_fails() {
        let controller = unreachable_poll_controller();
        let key = SessionKey::parse("nosuchsession000").unwrap();

        let result = controller.press(&key, ButtonEvent::Select).await;

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn power_closes_session_locally() {
        let controller = unreachable_poll_controller();
        let widget = Arc::new(RecordingWidget::default());
        let key = controller.open(weak(&widget)).await.unwrap();

        controller.press(&key, ButtonEvent::Power).await.unwrap();

        assert!(controller.registry().lookup(&key).is_none());
    }

    #[tokio::test]
    async fn image_url_uses_session_key() {
        let controller = unreachable_poll_controller();
        let key = SessionKey::parse("imgimgimgimg0000").unwrap();

        let url = controller.image_url(&key, true).unwrap();

        assert_eq!(url.path(), "/mfd/mfd.mjpeg");
        assert_eq!(url.query(), Some("key=imgimgimgimg0000&force=1"));
    }

    #[tokio::test]
    async fn handler_ignores_events_after_session_removed() {
        let controller = unreachable_poll_controller();
        let widget = Arc::new(RecordingWidget::default());
        let key = controller.open(weak(&widget)).await.unwrap();

        let handler = controller.label_handler(key.clone());
        handler(ChannelEvent::Labels(labels()));
        assert_eq!(widget.labels.lock().unwrap().len(), 12);

        controller.close(&key).await;
        handler(ChannelEvent::Labels(labels()));
        assert_eq!(widget.labels.lock().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn handler_forwards_transport_errors() {
        let controller = unreachable_poll_controller();
        let widget = Arc::new(RecordingWidget::default());
        let key = controller.open(weak(&widget)).await.unwrap();

        let handler = controller.label_handler(key.clone());
        handler(ChannelEvent::TransportError("connection refused".to_string()));

        assert!(
            widget
                .errors
                .lock()
                .unwrap()
                .iter()
                .any(|e| e == "connection refused")
        );
        controller.close(&key).await;
    }
}
