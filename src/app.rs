use crate::error::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const BASE_URL_ENV: &str = "BARTER_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub email: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            email: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "example", "barter")
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        Some(project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn cache_path() -> Option<PathBuf> {
        Some(project_dirs()?.data_dir().join("cache.sqlite"))
    }

    /// Load from the default location. A missing or unreadable file yields defaults;
    /// `BARTER_BASE_URL` overrides whatever the file says.
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = crate::utils::normalize_url(&url);
            }
        }
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str::<AppConfig>(&text)?)
    }

    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Err(crate::error::Error::Config("no config dir".into())),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// Where the session credential is persisted between runs.
#[derive(Debug, Clone)]
pub enum ConfigStore {
    Default,
    File(PathBuf),
    /// Nothing is written; used by tests and throwaway sessions.
    Memory,
}

impl ConfigStore {
    pub fn persist(&self, config: &AppConfig) -> Result<()> {
        match self {
            ConfigStore::Default => config.save(),
            ConfigStore::File(path) => config.save_to(path),
            ConfigStore::Memory => Ok(()),
        }
    }
}
