/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/epg-weaver.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PROGRAMME_BATCH_SIZE: usize = 1000;

// Storage defaults
pub const DEFAULT_DATA_PATH: &str = "./data";
pub const DEFAULT_CACHE_SUBDIR: &str = "cache/epgs";
pub const DEFAULT_OUTPUT_FILE_NAME: &str = "epg.xml";

// Ingestion defaults
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_SOURCE_CONCURRENCY: usize = 1;

// Synthesis defaults
pub const DEFAULT_APP_URL: &str = "http://localhost:9985";
pub const DEFAULT_GENERATOR_INFO_NAME: &str = "TVH-IPTV-Config";
pub const DEFAULT_SOURCE_INFO_NAME: &str = "TVH-IPTV-Config - v0.1";
pub const DEFAULT_CHANNEL_YIELD_MS: u64 = 100;

// Metadata enrichment defaults
pub const DEFAULT_ENABLE_TMDB_METADATA: bool = false;
pub const DEFAULT_ENABLE_IMAGE_SEARCH_METADATA: bool = false;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_METADATA_REQUEST_TIMEOUT_SECS: u64 = 15;
