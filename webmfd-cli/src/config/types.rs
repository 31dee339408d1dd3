use serde::{Deserialize, Serialize};
use webmfd_core::{ImageFormat, PanelConfig, ServerEndpoint, TransportKind};

pub use webmfd_core::{DEFAULT_HOST, DEFAULT_PORT};

/// Default number of panels opened by `webmfd run`
pub const DEFAULT_PANEL_COUNT: usize = 1;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawWebMfdConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub panel: RawPanelSection,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    /// Host of the MFD server
    pub host: Option<String>,

    /// Port of the MFD server
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPanelSection {
    pub transport: Option<TransportKind>,
    pub image_format: Option<ImageFormat>,
    pub reconnect_delay_ms: Option<u64>,
    pub count: Option<usize>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebMfdConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub panel: PanelSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host of the MFD server
    pub host: String,

    /// Port of the MFD server
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSection {
    /// push (WebSocket) or poll (HTTP)
    pub transport: TransportKind,

    /// Encoding of the panel image stream
    pub image_format: ImageFormat,

    /// Pause before a dropped push connection is retried
    pub reconnect_delay_ms: u64,

    /// Number of panels to open
    pub count: usize,
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            image_format: ImageFormat::default(),
            reconnect_delay_ms: 0,
            count: DEFAULT_PANEL_COUNT,
        }
    }
}

impl WebMfdConfig {
    /// Settings shared by every panel session
    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            transport: self.panel.transport,
            image_format: self.panel.image_format,
            reconnect_delay_ms: self.panel.reconnect_delay_ms,
            endpoint: ServerEndpoint::new(self.server.host.clone(), self.server.port),
        }
    }
}
