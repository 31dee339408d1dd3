//! Panel configuration types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TransportError;
use crate::key::SessionKey;
use crate::protocol::{ButtonEvent, encode_path_code};

/// Default host of the MFD server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of the MFD server
pub const DEFAULT_PORT: u16 = 8042;

/// Which transport a panel uses to talk to the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent WebSocket connection
    #[default]
    Push,
    /// One HTTP request per button press
    Poll,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "push" | "websocket" | "ws" => Ok(Self::Push),
            "poll" | "http" | "ajax" => Ok(Self::Poll),
            other => Err(format!("unknown transport '{}' (expected push or poll)", other)),
        }
    }
}

/// Encoding of the companion bitmap stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Motion JPEG
    #[default]
    Mjpeg,
    /// Multipart PNG
    Mpng,
}

impl ImageFormat {
    /// Path suffix understood by the image endpoint
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mjpeg => "mjpeg",
            Self::Mpng => "mpng",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mjpeg" | "jpeg" => Ok(Self::Mjpeg),
            "mpng" | "png" => Ok(Self::Mpng),
            other => Err(format!("unknown image format '{}' (expected mjpeg or mpng)", other)),
        }
    }
}

/// Address of the MFD server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn build(&self, scheme: &str, path: &str, key: &SessionKey) -> Result<Url, TransportError> {
        let raw = format!("{}://{}:{}{}", scheme, self.host, self.port, path);
        let mut url = Url::parse(&raw).map_err(|e| TransportError::InvalidEndpoint {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("key", key.as_str());
        Ok(url)
    }

    /// WebSocket address of the push button channel
    pub fn push_url(&self, key: &SessionKey) -> Result<Url, TransportError> {
        self.build("ws", "/btn/", key)
    }

    /// HTTP address of a single poll request
    pub fn poll_url(&self, event: ButtonEvent, key: &SessionKey) -> Result<Url, TransportError> {
        let code = encode_path_code(event)?;
        self.build("http", &format!("/btn_h/{}", code), key)
    }

    /// Address of the companion bitmap stream
    ///
    /// `force` asks the server for an immediate fresh frame.
    pub fn image_url(
        &self,
        key: &SessionKey,
        format: ImageFormat,
        force: bool,
    ) -> Result<Url, TransportError> {
        let mut url = self.build("http", &format!("/mfd/mfd.{}", format.extension()), key)?;
        if force {
            url.query_pairs_mut().append_pair("force", "1");
        }
        Ok(url)
    }
}

/// Configuration shared by every panel a controller opens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default)]
    pub image_format: ImageFormat,

    /// Pause before a push channel reconnects; zero reconnects immediately
    #[serde(default)]
    pub reconnect_delay_ms: u64,

    #[serde(default)]
    pub endpoint: ServerEndpoint,
}

impl PanelConfig {
    pub fn push(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            transport: TransportKind::Push,
            ..Default::default()
        }
    }

    pub fn poll(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            transport: TransportKind::Poll,
            ..Default::default()
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
