use crate::cli::display::{self, OutputFormat};
use crate::network::heartbeat::{HeartbeatConfig, DEFAULT_HEARTBEAT_INTERVAL};
use crate::network::reconnect::{
    Backoff, ReconnectConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};
use crate::network::{
    default_server_url, LinkConfig, LinkEvent, LinkHandle, WebSocketConnector,
};
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Backend host used when no configuration exists yet
pub const DEFAULT_HOST: &str = "localhost:3000";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the call-center channel
    pub server_url: String,
    /// Optional bearer token attached to the opening handshake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    pub heartbeat: HeartbeatSettings,
    pub reconnect: ReconnectSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub interval_ms: u64,
    /// Unset keeps best-effort pings with no response deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    /// Fixed delay, or the first delay for exponential backoff
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(DEFAULT_HOST),
            bearer_token: None,
            heartbeat: HeartbeatSettings::default(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            response_timeout_ms: None,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            strategy: BackoffStrategy::Fixed,
            delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Config {
    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        ProjectDirs::from("dev", "callcenter", "callcenter")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }

    /// Get the default config file path
    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default() -> Result<Self> {
        let config_file = Self::default_config_file()?;

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let config = Config::default();
            config.save_to(&config_file)?;
            Ok(config)
        }
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).context("Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content).context("Failed to write configuration file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            bail!("server_url must not be empty");
        }
        if self.heartbeat.interval_ms == 0 {
            bail!("heartbeat.interval_ms must be greater than zero");
        }
        if self.heartbeat.response_timeout_ms == Some(0) {
            bail!("heartbeat.response_timeout_ms must be greater than zero when set");
        }
        if self.reconnect.max_attempts == 0 {
            bail!("reconnect.max_attempts must be greater than zero");
        }
        if self.reconnect.strategy == BackoffStrategy::Exponential {
            if !(self.reconnect.multiplier >= 1.0 && self.reconnect.multiplier.is_finite()) {
                bail!("reconnect.multiplier must be a finite number >= 1.0");
            }
            if self.reconnect.max_delay_ms < self.reconnect.delay_ms {
                bail!("reconnect.max_delay_ms must not be below reconnect.delay_ms");
            }
        }
        Ok(())
    }

    /// Runtime settings for the link driver
    pub fn link_config(&self) -> LinkConfig {
        let heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(self.heartbeat.interval_ms),
            response_timeout: self.heartbeat.response_timeout_ms.map(Duration::from_millis),
        };

        let delay = Duration::from_millis(self.reconnect.delay_ms);
        let backoff = match self.reconnect.strategy {
            BackoffStrategy::Fixed => Backoff::Fixed(delay),
            BackoffStrategy::Exponential => Backoff::Exponential {
                initial: delay,
                max: Duration::from_millis(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
                jitter: self.reconnect.jitter,
            },
        };

        LinkConfig {
            heartbeat,
            reconnect: ReconnectConfig {
                max_attempts: self.reconnect.max_attempts,
                backoff,
            },
            ..LinkConfig::default()
        }
    }

    /// Connector for the configured address
    pub fn connector(&self) -> WebSocketConnector {
        let connector = WebSocketConnector::new(self.server_url.clone());
        match &self.bearer_token {
            Some(token) => connector.with_bearer_token(token.clone()),
            None => connector,
        }
    }
}

/// Main application state
pub struct App {
    pub config: Config,
    pub config_path: PathBuf,
}

impl App {
    /// Load the configuration from `path`, or from the default location
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let config = if path.exists() {
                    Config::load_from(&path)?
                } else {
                    Config::default()
                };
                Ok(App {
                    config,
                    config_path: path,
                })
            }
            None => Ok(App {
                config: Config::load_or_create_default()
                    .context("Failed to initialize configuration")?,
                config_path: Config::default_config_file()?,
            }),
        }
    }

    /// Handle the 'config show' command
    pub fn handle_config_show(&self) -> Result<()> {
        let content =
            toml::to_string_pretty(&self.config).context("Failed to serialize configuration")?;
        println!("# {}", self.config_path.display());
        print!("{}", content);
        Ok(())
    }

    /// Handle the 'config init' command
    pub fn handle_config_init(&self, force: bool) -> Result<()> {
        if self.config_path.exists() && !force {
            bail!(
                "Configuration already exists at {} (use --force to overwrite)",
                self.config_path.display()
            );
        }
        Config::default().save_to(&self.config_path)?;
        println!("Wrote default configuration to {}", self.config_path.display());
        Ok(())
    }

    /// Handle the 'listen' command: print events until Ctrl-C or connection loss
    pub async fn handle_listen(
        &mut self,
        url: Option<String>,
        token: Option<String>,
        format: OutputFormat,
    ) -> Result<()> {
        if let Some(url) = url {
            self.config.server_url = url;
        }
        if token.is_some() {
            self.config.bearer_token = token;
        }
        self.config.validate()?;

        let link = LinkHandle::spawn(self.config.connector(), self.config.link_config())
            .context("Invalid link configuration")?;
        let mut events = link.dispatcher().subscribe_all();
        let mut lifecycle = link.subscribe_events();

        info!(url = %self.config.server_url, "Connecting to call-center channel");
        link.connect().context("Failed to start connection")?;

        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        let outcome = loop {
            tokio::select! {
                _ = &mut interrupted => {
                    info!("Interrupted, disconnecting");
                    break Ok(());
                }
                event = events.recv() => match event {
                    Ok(event) => display::print_event(&event, format),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
                    Err(RecvError::Closed) => break Ok(()),
                },
                change = lifecycle.recv() => match change {
                    Ok(change) => {
                        display::print_link_event(&change, format);
                        if let LinkEvent::ConnectionLost { attempts } = change {
                            break Err(anyhow::anyhow!(
                                "Connection lost after {} reconnect attempts",
                                attempts
                            ));
                        }
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break Ok(()),
                },
            }
        };

        link.disconnect().await.context("Failed to disconnect")?;
        outcome
    }
}
