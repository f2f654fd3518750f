//! `config.toml` loading and live reload.
//!
//! Every key is optional. A missing file is created with the defaults so
//! users have something to edit.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use iced::futures::{SinkExt, Stream};
use iced::stream;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::components::system_tray::DEFAULT_ICON_SIZE;

const FILE_NAME: &str = "config.toml";

/// Editors write in several steps; wait for them to finish.
const RELOAD_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tray: TrayConfig,
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    /// Edge length of tray icons in pixels.
    pub icon_size: u16,
    /// Gap between neighbouring icons.
    pub spacing: f32,
    /// Padding inside each icon button.
    pub padding: f32,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            icon_size: DEFAULT_ICON_SIZE,
            spacing: 4.0,
            padding: 4.0,
        }
    }
}

/// Colors as `#rrggbb` strings, with separate alpha where it matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub background: String,
    pub background_alpha: f32,
    pub text: String,
    pub accent: String,
    pub muted: String,
    pub hover: String,
    pub hover_alpha: f32,
    pub menu_background: String,
    pub menu_background_alpha: f32,
    pub menu_border: String,
    pub menu_font_size: f32,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        // Tokyo Night
        Self {
            background: "#1a1b26".to_string(),
            background_alpha: 0.85,
            text: "#c0caf5".to_string(),
            accent: "#7aa2f7".to_string(),
            muted: "#565f89".to_string(),
            hover: "#414868".to_string(),
            hover_alpha: 0.5,
            menu_background: "#24283b".to_string(),
            menu_background_alpha: 0.94,
            menu_border: "#414868".to_string(),
            menu_font_size: 13.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// `$XDG_CONFIG_HOME/traybar/config.toml`
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("traybar")
        .join(FILE_NAME)
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "writing default config");
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let mut config: Config = toml::from_str(&fs::read_to_string(path)?)?;
        config.sanitize();
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    fn sanitize(&mut self) {
        if self.tray.icon_size == 0 {
            warn!(
                default = DEFAULT_ICON_SIZE,
                "tray.icon_size must be positive, using the default"
            );
            self.tray.icon_size = DEFAULT_ICON_SIZE;
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigMessage {
    Reloaded(Config),
    Error(String),
}

/// Emits [`ConfigMessage::Reloaded`] whenever the config file changes.
pub fn config_subscription() -> iced::Subscription<ConfigMessage> {
    iced::Subscription::run(watch_config)
}

/// Whether `event` touched the config file itself.
fn touches_config(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name().is_some_and(|name| name == FILE_NAME))
}

fn watch_config() -> impl Stream<Item = ConfigMessage> {
    stream::channel(100, |mut output| async move {
        let path = config_path();
        // Watch the directory: editors often replace the file.
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.clone());

        let (tx, mut rx) = tokio::sync::mpsc::channel::<Event>(10);
        let watcher: Result<RecommendedWatcher, _> = notify::recommended_watcher(move |res| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        });
        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                let _ = output
                    .send(ConfigMessage::Error(format!("cannot watch config: {e}")))
                    .await;
                std::future::pending::<()>().await;
                return;
            }
        };

        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            let _ = output
                .send(ConfigMessage::Error(format!(
                    "cannot watch {}: {e}",
                    dir.display()
                )))
                .await;
        }

        while let Some(event) = rx.recv().await {
            if !touches_config(&event) {
                continue;
            }

            tokio::time::sleep(RELOAD_DELAY).await;
            debug!(path = %path.display(), "config changed, reloading");

            let message = match Config::load_from(&path) {
                Ok(config) => ConfigMessage::Reloaded(config),
                Err(e) => ConfigMessage::Error(e.to_string()),
            };
            if output.send(message).await.is_err() {
                break;
            }
        }
    })
}
