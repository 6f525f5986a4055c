use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod credits;
pub mod programme;

pub use credits::Credits;
pub use programme::{Programme, StoredProgramme};

// Guide Source Models
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideSource {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideSourceCreateRequest {
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideSourceUpdateRequest {
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

/// Channel declaration as read from an XMLTV `<channel>` element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelDecl {
    pub id: String,
    pub display_name: Option<String>,
    pub icon_url: Option<String>,
}

/// One upstream channel identity inside a source's most recent ingestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideChannel {
    pub id: Uuid,
    pub source_id: Uuid,
    pub channel_id: String,
    pub display_name: Option<String>,
    pub icon_url: Option<String>,
}

/// Which upstream guide channel feeds an output channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuideMapping {
    pub source_id: Uuid,
    pub channel_id: String,
}

// Output Channel Models
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputChannel {
    pub id: Uuid,
    pub enabled: bool,
    pub name: String,
    pub number: i64,
    /// MIME type of the stored logo, used for the published artwork URL extension
    pub logo_mime: Option<String>,
    pub guide: Option<GuideMapping>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChannelCreateRequest {
    pub name: String,
    pub number: i64,
    pub enabled: bool,
    pub logo_mime: Option<String>,
    pub guide: Option<GuideMapping>,
    pub tags: Vec<String>,
}

impl OutputChannel {
    /// Identity used for this channel inside the published guide
    pub fn guide_id(&self) -> String {
        self.number.to_string()
    }
}

/// Result of ingesting a single source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestSummary {
    pub channel_count: usize,
    pub programme_count: usize,
    /// Programmes dropped because their channel was not declared
    pub orphaned_programmes: usize,
}

/// Per-source outcome of a batch ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub source_id: Uuid,
    pub source_name: String,
    pub result: Result<IngestSummary, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionProgress {
    pub source_id: Uuid,
    pub state: IngestionState,
    pub progress: ProgressInfo,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestionState {
    Idle,
    Downloading,
    Parsing,
    Saving,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub current_step: String,
    pub downloaded_bytes: Option<u64>,
    pub channels_parsed: Option<usize>,
    pub programmes_parsed: Option<usize>,
    pub programmes_saved: Option<usize>,
    pub percentage: Option<f64>,
}
