use super::types::{
    DEFAULT_HOST, DEFAULT_PANEL_COUNT, DEFAULT_PORT, PanelSection, RawPanelSection,
    RawServerConfig, RawWebMfdConfig, ServerConfig, WebMfdConfig,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<WebMfdConfig> {
        Self::load_with(RawWebMfdConfig::default())
    }

    /// Load merged configuration, then apply command-line overrides on top
    pub fn load_with(overrides: RawWebMfdConfig) -> Result<WebMfdConfig> {
        Self::load_layers(
            Self::user_config_path().as_deref(),
            &Self::project_config_path(),
            overrides,
        )
    }

    /// Merge the user file, the project file and `overrides`, in that order
    pub fn load_layers(
        user_path: Option<&Path>,
        project_path: &Path,
        overrides: RawWebMfdConfig,
    ) -> Result<WebMfdConfig> {
        let mut raw = RawWebMfdConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user_path
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(user_path)?);
        }

        // Layer 2: Project config
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project_path)?);
        }

        // Layer 3: Command-line flags
        raw = Self::merge_raw(raw, overrides);

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<RawWebMfdConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "webmfd").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with WEBMFD_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("WEBMFD_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".webmfd/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawWebMfdConfig, overlay: RawWebMfdConfig) -> RawWebMfdConfig {
        RawWebMfdConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
            },
            panel: RawPanelSection {
                transport: overlay.panel.transport.or(base.panel.transport),
                image_format: overlay.panel.image_format.or(base.panel.image_format),
                reconnect_delay_ms: overlay
                    .panel
                    .reconnect_delay_ms
                    .or(base.panel.reconnect_delay_ms),
                count: overlay.panel.count.or(base.panel.count),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawWebMfdConfig) -> WebMfdConfig {
        WebMfdConfig {
            server: ServerConfig {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
            },
            panel: PanelSection {
                transport: raw.panel.transport.unwrap_or_default(),
                image_format: raw.panel.image_format.unwrap_or_default(),
                reconnect_delay_ms: raw.panel.reconnect_delay_ms.unwrap_or(0),
                count: raw.panel.count.unwrap_or(DEFAULT_PANEL_COUNT),
            },
        }
    }
}
