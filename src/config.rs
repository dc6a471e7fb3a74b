//! Application settings.
//!
//! Settings are layered: built-in defaults, then `config.toml` in the
//! platform config directory, then `ANISTREAM_*` environment variables
//! (for example `ANISTREAM_ZORO_BASE_URL` or `ANISTREAM_PLAYER`).

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File};
use dirs_next::{cache_dir, config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const APP_NAME: &str = "anistream";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "ANISTREAM";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Consumet-compatible host serving the `/anime/zoro/*` routes.
    pub zoro_base_url: String,
    pub jikan_base_url: String,
    /// Site scraped for the top-anime sidebar.
    pub scrape_url: String,
    /// Player command line, split with shell quoting rules.
    pub player: String,
    pub server: String,
    pub preferred_subtitle: String,
    pub catalog_limit: usize,
    pub featured_limit: usize,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoro_base_url: String::from("https://api.consumet.org"),
            jikan_base_url: String::from("https://api.jikan.moe/v4"),
            scrape_url: String::from("https://gojo.wtf"),
            player: String::from("mpv"),
            server: String::from("vidstreaming"),
            preferred_subtitle: String::from("english"),
            catalog_limit: 20,
            featured_limit: 5,
            cache_dir: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to load settings from {}", path.display()))?
            .try_deserialize::<Settings>()
            .context("failed to parse settings")?;
        Ok(settings)
    }

    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        let data = toml::to_string_pretty(&Settings::default())
            .context("failed to serialize default settings")?;
        fs::write(path, data)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn response_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let base = cache_dir().ok_or_else(|| anyhow!("Could not determine cache directory"))?;
        Ok(base.join(APP_NAME).join("responses"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join(APP_NAME).join(CONFIG_FILE))
}

pub fn history_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join(APP_NAME).join("history.json"))
}
