//! Full guide refresh: ingest, enrich, synthesize, reload

use crate::config::Config;
use crate::database::Database;
use crate::enrichment::{EnrichmentEngine, EnrichmentSummary};
use crate::errors::AppResult;
use crate::ingestor::{GuideIngestor, IngestionStateManager};
use crate::models::IngestReport;
use crate::reload::{self, GuideServerReload};
use crate::synthesizer::{EpgSynthesizer, SynthesisSummary};
use tracing::{info, warn};

#[derive(Debug)]
pub struct PipelineReport {
    pub ingest: IngestReport,
    pub enrichment: EnrichmentSummary,
    pub synthesis: SynthesisSummary,
    pub reloaded: bool,
}

pub struct Pipeline {
    database: Database,
    ingestor: GuideIngestor,
    enrichment: EnrichmentEngine,
    synthesizer: EpgSynthesizer,
    reload: Box<dyn GuideServerReload>,
}

impl Pipeline {
    pub fn from_config(database: Database, config: &Config) -> AppResult<Self> {
        let ingestor = GuideIngestor::new(
            database.clone(),
            config.storage.clone(),
            config.ingestion.clone(),
            IngestionStateManager::new(),
        )?;
        Ok(Self {
            ingestor,
            enrichment: EnrichmentEngine::from_config(&config.metadata)?,
            synthesizer: EpgSynthesizer::new(
                database.clone(),
                config.synthesis.clone(),
                &config.storage,
            ),
            reload: reload::from_config(&config.guide_server)?,
            database,
        })
    }

    pub fn ingestor(&self) -> &GuideIngestor {
        &self.ingestor
    }

    pub fn enrichment(&self) -> &EnrichmentEngine {
        &self.enrichment
    }

    pub fn synthesizer(&self) -> &EpgSynthesizer {
        &self.synthesizer
    }

    /// Rebuild the guide file, then ask the guide server to pick it up
    pub async fn build_and_reload(&self) -> AppResult<(SynthesisSummary, bool)> {
        let synthesis = self.synthesizer.build().await?;
        let reloaded = match self.reload.reload().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Guide server reload failed: {}", e);
                false
            }
        };
        Ok((synthesis, reloaded))
    }

    /// Refresh every enabled source and republish the guide.
    ///
    /// Source failures are reported in the result; only storage failures abort.
    pub async fn run(&self) -> AppResult<PipelineReport> {
        let ingest = self.ingestor.ingest_all().await?;
        info!(
            "Ingestion finished: {} succeeded, {} failed",
            ingest.succeeded(),
            ingest.failed()
        );

        let enrichment = self.enrichment.enrich_output_channels(&self.database).await?;
        let (synthesis, reloaded) = self.build_and_reload().await?;

        Ok(PipelineReport {
            ingest,
            enrichment,
            synthesis,
            reloaded,
        })
    }
}
