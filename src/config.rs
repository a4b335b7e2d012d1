use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `fetcher.base_url` when set
pub const FETCH_URL_ENV: &str = "COURSE_REFRESH_FETCH_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub queue: QueueConfig,
    pub refresh: RefreshConfig,
    pub fetcher: FetcherConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub buffer_size: i64,
    pub workers: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            workers: 5,
        }
    }
}

impl QueueConfig {
    /// Buffer capacity; zero or negative becomes 1
    pub fn buffer_capacity(&self) -> usize {
        clamp_to_one(self.buffer_size)
    }

    /// Worker count; zero or negative becomes 1
    pub fn worker_count(&self) -> usize {
        clamp_to_one(self.workers)
    }
}

fn clamp_to_one(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0).max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// How long a first-time read waits before reporting pending
    pub wait_timeout_ms: u64,
    /// Deadline for one upstream fetch
    pub fetch_timeout_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 3000,
            fetch_timeout_ms: 300000,
        }
    }
}

impl RefreshConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Upstream course API; without it reads never trigger a fetch
    pub base_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: 300000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            queue: QueueConfig::default(),
            refresh: RefreshConfig::default(),
            fetcher: FetcherConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env_overrides(std::env::var(FETCH_URL_ENV).ok());
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, fetch_url: Option<String>) {
        if let Some(url) = fetch_url.filter(|u| !u.trim().is_empty()) {
            log::info!("Using upstream URL from {}", FETCH_URL_ENV);
            self.fetcher.base_url = Some(url);
        }
    }
}
