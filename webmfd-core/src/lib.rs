//! webmfd-core: session and transport core for remote MFD display panels
//!
//! Each panel on a host is bound to the MFD server by an opaque session
//! key. The panel's twelve soft-key captions follow the server's label
//! state, and its button presses travel to the server, over one of two
//! interchangeable transports.
//!
//! - **Keys** - [`KeyAllocator`] draws unique 16-character [`SessionKey`]s
//! - **Sessions** - [`SessionRegistry`] owns live sessions, [`SessionController`] opens, drives and closes them
//! - **Transports** - [`TransportChannel`] with [`PushChannel`] (WebSocket) and [`PollChannel`] (HTTP)
//! - **Protocol** - [`ButtonEvent`] codes and [`LabelSet`] payloads
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::{Arc, Weak};
//! use webmfd_core::{PanelConfig, PanelWidget, SessionController, SessionRegistry, ButtonEvent};
//!
//! struct Panel;
//!
//! impl PanelWidget for Panel {
//!     fn set_button_label(&self, slot: usize, text: &str) {
//!         println!("{slot}: {text}");
//!     }
//!     fn notify_error(&self, message: &str) {
//!         eprintln!("{message}");
//!     }
//! }
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = SessionController::new(PanelConfig::default(), Arc::new(SessionRegistry::new()));
//!
//!     let panel: Arc<dyn PanelWidget> = Arc::new(Panel);
//!     let key = controller.open(Arc::downgrade(&panel)).await?;
//!     controller.press(&key, ButtonEvent::Select).await?;
//!     controller.close(&key).await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                SessionController                 │
//! │  KeyAllocator ──► SessionRegistry                │
//! │                   ┌───────────────────────────┐  │
//! │                   │ Session                   │  │
//! │                   │  ├─ Weak<dyn PanelWidget> │  │
//! │                   │  └─ TransportChannel      │  │
//! │                   │      ├─ PushChannel (ws)  │  │
//! │                   │      └─ PollChannel (http)│  │
//! │                   └───────────────────────────┘  │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod widget;

// Re-export key types for convenience
pub use config::{
    DEFAULT_HOST, DEFAULT_PORT, ImageFormat, PanelConfig, ServerEndpoint, TransportKind,
};
pub use error::{KeyError, ProtocolError, SessionError, TransportError, WebMfdError};
pub use key::{KEY_ALPHABET, KEY_LENGTH, KeyAllocator, SessionKey};
pub use protocol::{ButtonEvent, LabelSet, Payload, Side, decode_payload, encode_frame};
pub use session::{Session, SessionController, SessionRegistry, SessionState};
pub use transport::{
    ChannelEvent, ChannelState, MessageHandler, PollChannel, PushChannel, TransportChannel,
    build_channel,
};
pub use widget::PanelWidget;
