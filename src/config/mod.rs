use crate::classify::{default_rules, ClassificationRule, DEFAULT_DESTINATION};
use crate::global;
use crate::retry::DEFAULT_MAX_RETRIES;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const ENV_CONFIG_PATH: &str = "ZOOM_ARCHIVE_CONFIG";
pub const ENV_DELETE_AFTER_UPLOAD: &str = "ZOOM_ARCHIVE_DELETE_AFTER_UPLOAD";
pub const ENV_DRY_RUN: &str = "ZOOM_ARCHIVE_DRY_RUN";
pub const ENV_ZOOM_CLIENT_ID: &str = "ZOOM_CLIENT_ID";
pub const ENV_ZOOM_CLIENT_SECRET: &str = "ZOOM_CLIENT_SECRET";
pub const ENV_ZOOM_ACCOUNT_ID: &str = "ZOOM_ACCOUNT_ID";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub zoom: ZoomConfig,
    pub sync: SyncConfig,
    pub youtube: YouTubeConfig,
    pub gdrive: DriveConfig,
    /// Ordered classification rules, first match wins
    pub rules: Vec<ClassificationRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zoom: ZoomConfig::default(),
            sync: SyncConfig::default(),
            youtube: YouTubeConfig::default(),
            gdrive: DriveConfig::default(),
            rules: default_rules(),
        }
    }
}

/// Server-to-server OAuth app. Usually left empty in the file and supplied
/// through `ZOOM_CLIENT_ID`, `ZOOM_CLIENT_SECRET` and `ZOOM_ACCOUNT_ID`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub client_id: String,
    pub client_secret: String,
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Destination used when `--service` is not given
    pub service: String,
    /// Recordings must be strictly longer than this
    pub min_duration_minutes: u32,
    /// Only sync topics listed in `allow_list`
    pub filter_allow_list: bool,
    pub allow_list: Vec<String>,
    /// A meeting whose participants all match one of these is treated as
    /// unattended
    pub ignore_participants: Vec<String>,
    pub delete_after_upload: bool,
    pub dry_run: bool,
    pub max_retries: u32,
    /// Classification key for topics no rule matches
    pub default_destination: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service: "youtube".to_string(),
            min_duration_minutes: 1,
            filter_allow_list: false,
            allow_list: vec!["EDGI Community Standup".to_string()],
            ignore_participants: vec!["Zoom Bot".to_string(), "Otter.ai".to_string()],
            delete_after_upload: false,
            dry_run: false,
            max_retries: DEFAULT_MAX_RETRIES,
            default_destination: DEFAULT_DESTINATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub credentials_path: PathBuf,
    /// Every upload lands here, and duplicates are looked up here
    pub default_playlist: String,
    pub category_id: String,
    pub license: String,
    pub privacy: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(".youtube-upload-credentials.json"),
            default_playlist: DEFAULT_DESTINATION.to_string(),
            // Science & Technology
            category_id: "28".to_string(),
            license: "creativeCommon".to_string(),
            privacy: "unlisted".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub credentials_path: PathBuf,
    /// Folder the category folders are created under
    pub root_folder_id: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(".gdrive-upload-credentials.json"),
            root_folder_id: "root".to_string(),
        }
    }
}

/// `true`, `1`, `y` and `yes` in any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "y" | "yes"
    )
}

impl Config {
    /// Load from `ZOOM_ARCHIVE_CONFIG` or the default location, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::config_path()?,
        };
        Self::load_from(&config_path)
    }

    /// Load a specific file. A missing file is created with defaults.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        } else {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Environment values win over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(id) = non_empty(ENV_ZOOM_CLIENT_ID) {
            self.zoom.client_id = id;
        }
        if let Some(secret) = non_empty(ENV_ZOOM_CLIENT_SECRET) {
            self.zoom.client_secret = secret;
        }
        if let Some(account) = non_empty(ENV_ZOOM_ACCOUNT_ID) {
            self.zoom.account_id = account;
        }
        if let Some(value) = non_empty(ENV_DELETE_AFTER_UPLOAD) {
            self.sync.delete_after_upload = is_truthy(&value);
        }
        if non_empty(ENV_DRY_RUN).is_some_and(|v| is_truthy(&v)) {
            self.sync.dry_run = true;
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
