// Configuration management for skywave
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Shown in the notification and the terminal.
    pub name: String,
    /// The one stream this service plays. Immutable for the session's life.
    pub stream_url: String,
    /// Optional text endpoint for the `info` command.
    pub info_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Volume while another app holds transient "can duck" focus. 0.0 to 1.0.
    pub duck_volume: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: StationConfig {
                name: "SomaFM Groove Salad".to_string(),
                stream_url: "https://ice1.somafm.com/groovesalad-128-mp3".to_string(),
                info_url: Some("https://somafm.com/songs/groovesalad.xml".to_string()),
            },
            audio: AudioConfig { duck_volume: 0.1 },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("skywave");

        Ok(config_dir.join("config.toml"))
    }
}
