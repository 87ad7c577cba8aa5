use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_schema_version() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub page_size: u32,
    pub suggestion_limit: u32,
    pub timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jiosavan-api-with-playlist.vercel.app".to_string(),
            page_size: 20,
            suggestion_limit: 20,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_volume: f32,
    /// Retry playback shortly after a track becomes current but idle.
    pub auto_resume: bool,
    pub auto_resume_delay_ms: u64,
    /// Zero disables the load timeout.
    pub load_timeout_ms: u64,
    pub persist_interval_ms: u64,
    pub event_tick_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            auto_resume: false,
            auto_resume_delay_ms: 100,
            load_timeout_ms: 30_000,
            persist_interval_ms: 5_000,
            event_tick_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub offline_cache: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_dir: None,
            offline_cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            log_level: default_log_level(),
            catalog: CatalogConfig::default(),
            playback: PlaybackConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
