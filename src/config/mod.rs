use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

pub mod defaults;

use defaults::*;

/// Maximum bound variables per SQLite statement (SQLite 3.32.0+)
pub const SQLITE_MAX_VARIABLES: usize = 32766;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub guide_server: GuideServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Programmes buffered per flush while replacing a source's rows
    #[serde(default = "default_programme_batch_size")]
    pub programme_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Downloaded source documents, defaults to `<data_path>/cache/epgs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Synthesized guide, defaults to `<data_path>/epg.xml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: usize,
    /// Sources ingested at the same time by `ingest_all`
    #[serde(default = "default_source_concurrency")]
    pub source_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Public base URL of the logo-serving application
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default = "default_generator_info_name")]
    pub generator_info_name: String,
    #[serde(default = "default_source_info_name")]
    pub source_info_name: String,
    #[serde(default = "default_channel_yield_ms")]
    pub channel_yield_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_enable_tmdb_metadata")]
    pub enable_tmdb_metadata: bool,
    #[serde(default)]
    pub tmdb_api_key: String,
    #[serde(default = "default_enable_image_search_metadata")]
    pub enable_google_image_search_metadata: bool,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_metadata_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuideServerConfig {
    /// Endpoint that makes the guide server re-read the output file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}
fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}
fn default_programme_batch_size() -> usize {
    DEFAULT_PROGRAMME_BATCH_SIZE
}
fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}
fn default_download_chunk_size() -> usize {
    DEFAULT_DOWNLOAD_CHUNK_SIZE
}
fn default_source_concurrency() -> usize {
    DEFAULT_SOURCE_CONCURRENCY
}
fn default_app_url() -> String {
    DEFAULT_APP_URL.to_string()
}
fn default_generator_info_name() -> String {
    DEFAULT_GENERATOR_INFO_NAME.to_string()
}
fn default_source_info_name() -> String {
    DEFAULT_SOURCE_INFO_NAME.to_string()
}
fn default_channel_yield_ms() -> u64 {
    DEFAULT_CHANNEL_YIELD_MS
}
fn default_enable_tmdb_metadata() -> bool {
    DEFAULT_ENABLE_TMDB_METADATA
}
fn default_enable_image_search_metadata() -> bool {
    DEFAULT_ENABLE_IMAGE_SEARCH_METADATA
}
fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}
fn default_metadata_request_timeout_secs() -> u64 {
    DEFAULT_METADATA_REQUEST_TIMEOUT_SECS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            programme_batch_size: default_programme_batch_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            cache_dir: None,
            output_file: None,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            download_chunk_size: default_download_chunk_size(),
            source_concurrency: default_source_concurrency(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
            generator_info_name: default_generator_info_name(),
            source_info_name: default_source_info_name(),
            channel_yield_ms: default_channel_yield_ms(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enable_tmdb_metadata: default_enable_tmdb_metadata(),
            tmdb_api_key: String::new(),
            enable_google_image_search_metadata: default_enable_image_search_metadata(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_metadata_request_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    /// Columns bound per programme row
    pub const PROGRAMME_FIELDS: usize = 38;

    /// Rows per INSERT statement so a single statement stays under the SQLite variable limit
    pub fn safe_programme_insert_rows(&self) -> usize {
        let max_safe = SQLITE_MAX_VARIABLES / Self::PROGRAMME_FIELDS;
        self.programme_batch_size.clamp(1, max_safe)
    }
}

impl StorageConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_path.join(DEFAULT_CACHE_SUBDIR))
    }

    pub fn output_file(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| self.data_path.join(DEFAULT_OUTPUT_FILE_NAME))
    }

    /// Local copy of a source's downloaded document
    pub fn source_cache_file(&self, source_id: &uuid::Uuid) -> PathBuf {
        self.cache_dir().join(format!("{source_id}.xml"))
    }
}

impl IngestionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl MetadataConfig {
    /// Whether any provider is switched on
    pub fn any_enabled(&self) -> bool {
        self.enable_tmdb_metadata || self.enable_google_image_search_metadata
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(Path::new(&config_file))
    }

    /// Read the file at `path`, or write the defaults there if it does not exist
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents).map_err(|e| {
                AppError::configuration(format!("Invalid config file {}: {e}", path.display()))
            })?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::configuration(format!("Cannot render defaults: {e}")))?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.database.programme_batch_size == 0 {
            return Err(AppError::configuration(
                "database.programme_batch_size must be greater than zero",
            ));
        }
        if self.ingestion.source_concurrency == 0 {
            return Err(AppError::configuration(
                "ingestion.source_concurrency must be greater than zero",
            ));
        }
        if self.metadata.max_concurrent_requests == 0 {
            return Err(AppError::configuration(
                "metadata.max_concurrent_requests must be greater than zero",
            ));
        }
        if self.metadata.enable_tmdb_metadata && self.metadata.tmdb_api_key.trim().is_empty() {
            return Err(AppError::configuration(
                "metadata.tmdb_api_key is required when enable_tmdb_metadata is set",
            ));
        }
        Ok(())
    }

    /// Point every storage path under `data_path`
    pub fn with_data_path<P: Into<PathBuf>>(mut self, data_path: P) -> Self {
        self.storage.data_path = data_path.into();
        self
    }
}
