//! Run panels against an MFD server

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use webmfd_core::{
    ImageFormat, PanelWidget, SessionController, SessionKey, SessionRegistry, TransportKind,
};

use crate::config::{ConfigLoader, RawPanelSection, RawServerConfig, RawWebMfdConfig};
use crate::console::{Command, ConsolePanel, HELP, parse_command};

/// Run arguments; each flag overrides the configuration files
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Host of the MFD server
    #[arg(long)]
    pub host: Option<String>,

    /// Port of the MFD server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Transport to use (push or poll)
    #[arg(short, long)]
    pub transport: Option<TransportKind>,

    /// Image stream format (mjpeg or mpng)
    #[arg(long)]
    pub image_format: Option<ImageFormat>,

    /// Number of panels to open
    #[arg(short = 'n', long)]
    pub panels: Option<usize>,
}

impl RunArgs {
    fn overrides(&self) -> RawWebMfdConfig {
        RawWebMfdConfig {
            server: RawServerConfig {
                host: self.host.clone(),
                port: self.port,
            },
            panel: RawPanelSection {
                transport: self.transport,
                image_format: self.image_format,
                reconnect_delay_ms: None,
                count: self.panels,
            },
        }
    }
}

struct OpenPanel {
    key: SessionKey,
    widget: Arc<ConsolePanel>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load_with(args.overrides())?;
    if config.panel.count == 0 {
        anyhow::bail!("At least one panel is required");
    }

    let controller = SessionController::new(config.panel_config(), Arc::new(SessionRegistry::new()));
    info!(
        server = %format!("{}:{}", config.server.host, config.server.port),
        transport = %config.panel.transport,
        panels = config.panel.count,
        "Starting panels"
    );

    let force = config.panel.transport == TransportKind::Poll;
    let result = match open_panels(&controller, config.panel.count, force).await {
        Ok(panels) => {
            println!();
            println!("{}", HELP);
            drive(&controller, &panels).await
        }
        Err(e) => Err(e),
    };

    // Panels opened before a failure still get their teardown
    controller.close_all().await;
    info!("All panels closed");
    result
}

/// Open `count` panels, printing each key and image address
async fn open_panels(
    controller: &SessionController,
    count: usize,
    force: bool,
) -> Result<Vec<OpenPanel>> {
    let mut panels = Vec::with_capacity(count);
    for number in 1..=count {
        let widget = Arc::new(ConsolePanel::new(number));
        let handle: Arc<dyn PanelWidget> = widget.clone();
        let key = controller
            .open(Arc::downgrade(&handle))
            .await
            .with_context(|| format!("Failed to open panel {}", number))?;
        let image = controller.image_url(&key, force)?;
        println!("Panel {}: key {}  image {}", number, key, image);
        panels.push(OpenPanel { key, widget });
    }
    Ok(panels)
}

/// Read commands until quit, EOF, Ctrl-C or every panel is powered off
async fn drive(controller: &SessionController, panels: &[OpenPanel]) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                return Ok(());
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line, panels.len()) {
            Ok(Command::Press { panel, event }) => {
                let target = &panels[panel - 1];
                if let Err(e) = controller.press(&target.key, event).await {
                    eprintln!("Panel {}: {}", panel, e);
                }
                if controller.sessions().is_empty() {
                    println!("All panels powered off");
                    return Ok(());
                }
            }
            Ok(Command::Show) => {
                for open in panels {
                    if controller.registry().contains(&open.key) {
                        println!("{}", open.widget.render());
                    } else {
                        println!("[panel {}] off", open.widget.number());
                    }
                }
            }
            Ok(Command::Help) => println!("{}", HELP),
            Ok(Command::Quit) => return Ok(()),
            Err(message) => eprintln!("{}", message),
        }
    }
}
