//! Transport channels between a panel session and the MFD server
//!
//! Two interchangeable implementations sit behind [`TransportChannel`]:
//! [`PushChannel`] keeps one WebSocket open per session, [`PollChannel`]
//! issues one HTTP request per button event. Both report server label
//! updates through a single registered [`MessageHandler`].

pub mod poll;
pub mod push;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{PanelConfig, TransportKind};
use crate::error::TransportError;
use crate::key::SessionKey;
use crate::protocol::{ButtonEvent, LabelSet};

pub use poll::PollChannel;
pub use push::PushChannel;

/// How long `close` waits for a channel's background task to finish
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a transport channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Constructed but not opened
    #[default]
    Idle,
    /// Establishing (or re-establishing) a connection
    Connecting,
    /// Accepting button events
    Open,
    /// Close requested, draining
    Closing,
    /// Terminal
    Closed,
}

/// Something a channel reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The server sent a fresh set of captions
    Labels(LabelSet),
    /// A connection-level failure the user should hear about
    TransportError(String),
}

/// Callback receiving channel events
pub type MessageHandler = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// A bidirectional button/label transport for one session
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Session key this channel is addressed by
    fn key(&self) -> &SessionKey;

    fn kind(&self) -> TransportKind;

    fn state(&self) -> ChannelState;

    /// Whether a teardown notification can still reach the server
    fn is_live(&self) -> bool;

    /// Start the channel's background work
    async fn open(&self) -> Result<(), TransportError>;

    /// Queue a button event for delivery
    async fn send(&self, event: ButtonEvent) -> Result<(), TransportError>;

    /// Register the handler for channel events, replacing any previous one
    fn on_message(&self, handler: MessageHandler);

    /// Detach the handler; later events are dropped
    fn clear_handler(&self);

    /// Stop the channel for good
    async fn close(&self);
}

/// Build the channel variant selected by `config`
pub fn build_channel(
    config: &PanelConfig,
    key: SessionKey,
    client: &reqwest::Client,
) -> Result<Arc<dyn TransportChannel>, TransportError> {
    let channel: Arc<dyn TransportChannel> = match config.transport {
        TransportKind::Push => Arc::new(PushChannel::new(
            key,
            &config.endpoint,
            config.reconnect_delay(),
        )?),
        TransportKind::Poll => Arc::new(PollChannel::new(
            key,
            config.endpoint.clone(),
            client.clone(),
        )),
    };
    Ok(channel)
}

/// Single registration point for a channel's handler
#[derive(Clone, Default)]
pub(crate) struct HandlerSlot(Arc<RwLock<Option<MessageHandler>>>);

impl HandlerSlot {
    pub(crate) fn set(&self, handler: MessageHandler) {
        if let Ok(mut slot) = self.0.write() {
            *slot = Some(handler);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut slot) = self.0.write() {
            *slot = None;
        }
    }

    /// Deliver an event; a no-op when nothing is registered
    pub(crate) fn dispatch(&self, event: ChannelEvent) {
        let handler = self.0.read().map(|slot| slot.clone()).unwrap_or_default();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

/// Shared, lock-protected channel state
#[derive(Debug, Default)]
pub(crate) struct StateCell(RwLock<ChannelState>);

impl StateCell {
    pub(crate) fn get(&self) -> ChannelState {
        self.0.read().map(|s| *s).unwrap_or(ChannelState::Closed)
    }

    pub(crate) fn set(&self, state: ChannelState) {
        if let Ok(mut current) = self.0.write() {
            *current = state;
        }
    }
}
