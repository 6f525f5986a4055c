use crate::config::{IngestionConfig, StorageConfig};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::ingestor::download::{build_client, download_to_file};
use crate::ingestor::state_manager::IngestionStateManager;
use crate::models::*;
use crate::utils::decompression::DecompressionService;
use crate::xmltv::{decode_streaming, XmltvItem};
use futures::StreamExt;
use reqwest::Client;
use std::fs::File;
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Items in flight between the blocking parser and the store
const DECODE_CHANNEL_CAPACITY: usize = 1024;

/// Downloads, decodes and stores XMLTV guide sources
#[derive(Clone)]
pub struct GuideIngestor {
    database: Database,
    client: Client,
    storage: StorageConfig,
    ingestion: IngestionConfig,
    state_manager: IngestionStateManager,
}

impl GuideIngestor {
    pub fn new(
        database: Database,
        storage: StorageConfig,
        ingestion: IngestionConfig,
        state_manager: IngestionStateManager,
    ) -> AppResult<Self> {
        let client = build_client(&ingestion)?;
        Ok(Self {
            database,
            client,
            storage,
            ingestion,
            state_manager,
        })
    }

    pub fn state_manager(&self) -> &IngestionStateManager {
        &self.state_manager
    }

    /// Ingest one source, replacing everything previously stored for it.
    ///
    /// On failure the source's previously stored data is left untouched.
    pub async fn ingest_source(&self, source: &GuideSource) -> AppResult<IngestSummary> {
        if !self.state_manager.try_start(source.id).await {
            return Err(AppError::validation(format!(
                "guide source '{}' is already being ingested",
                source.name
            )));
        }

        info!("Starting guide ingestion for source: {} ({})", source.name, source.id);

        match self.run_ingestion(source).await {
            Ok(summary) => {
                self.state_manager
                    .complete_ingestion(source.id, &summary)
                    .await;
                info!(
                    "Ingested source '{}': {} channels, {} programmes ({} orphaned)",
                    source.name,
                    summary.channel_count,
                    summary.programme_count,
                    summary.orphaned_programmes
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Ingestion of source '{}' failed: {}", source.name, e);
                self.state_manager.set_error(source.id, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_ingestion(&self, source: &GuideSource) -> AppResult<IngestSummary> {
        self.state_manager
            .update_progress(
                source.id,
                IngestionState::Downloading,
                ProgressInfo {
                    current_step: "Downloading guide".to_string(),
                    percentage: Some(10.0),
                    ..Default::default()
                },
            )
            .await;

        let path = self.storage.source_cache_file(&source.id);
        let download_started = Instant::now();
        let downloaded = download_to_file(
            &self.client,
            &source.url,
            &path,
            self.ingestion.download_chunk_size,
        )
        .await?;

        let decompress_path = path.clone();
        tokio::task::spawn_blocking(move || {
            DecompressionService::decompress_file_in_place(&decompress_path)
        })
        .await
        .map_err(|e| AppError::internal(format!("decompression task failed: {e}")))??;
        info!(
            "Downloaded {} bytes for '{}' in {:.1}s",
            downloaded,
            source.name,
            download_started.elapsed().as_secs_f64()
        );

        self.state_manager
            .update_progress(
                source.id,
                IngestionState::Parsing,
                ProgressInfo {
                    current_step: "Parsing and saving guide".to_string(),
                    downloaded_bytes: Some(downloaded),
                    percentage: Some(40.0),
                    ..Default::default()
                },
            )
            .await;

        let parse_started = Instant::now();
        let summary = self.store_document(source.id, path).await?;
        info!(
            "Parsed and stored '{}' in {:.1}s",
            source.name,
            parse_started.elapsed().as_secs_f64()
        );
        self.database
            .update_guide_source_last_ingested(source.id)
            .await?;
        Ok(summary)
    }

    /// Decode the cached document on a blocking thread and stream its items
    /// into a single source replacement transaction.
    async fn store_document(&self, source_id: Uuid, path: PathBuf) -> AppResult<IngestSummary> {
        // Waits for any other source that is still being stored
        let mut replacement = self.database.begin_source_replacement(source_id).await?;
        let (tx, mut rx) = mpsc::channel::<XmltvItem>(DECODE_CHANNEL_CAPACITY);

        let parser = tokio::task::spawn_blocking(move || -> AppResult<()> {
            let reader = BufReader::new(File::open(&path)?);
            decode_streaming(reader, |item| match tx.blocking_send(item) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            })?;
            Ok(())
        });

        let mut channels_parsed = 0usize;
        let mut programmes_parsed = 0usize;

        while let Some(item) = rx.recv().await {
            match item {
                XmltvItem::Channel(channel) => {
                    channels_parsed += 1;
                    replacement.add_channel(channel).await?;
                }
                XmltvItem::Programme(programme) => {
                    programmes_parsed += 1;
                    replacement.add_programme(programme).await?;
                    if programmes_parsed % 10_000 == 0 {
                        self.state_manager
                            .update_progress(
                                source_id,
                                IngestionState::Saving,
                                ProgressInfo {
                                    current_step: "Saving programmes".to_string(),
                                    channels_parsed: Some(channels_parsed),
                                    programmes_parsed: Some(programmes_parsed),
                                    programmes_saved: Some(replacement.programmes_saved()),
                                    ..Default::default()
                                },
                            )
                            .await;
                    }
                }
            }
        }

        // A parse error surfaces here; dropping `replacement` rolls back
        parser
            .await
            .map_err(|e| AppError::internal(format!("parser task failed: {e}")))??;

        replacement.commit().await
    }

    /// Ingest every enabled source, at most `source_concurrency` at a time.
    ///
    /// A failing source is reported and does not stop the others.
    pub async fn ingest_all(&self) -> AppResult<IngestReport> {
        let sources: Vec<GuideSource> = self
            .database
            .list_guide_sources()
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();

        info!("Ingesting {} enabled guide sources", sources.len());

        let concurrency = self.ingestion.source_concurrency.max(1);
        let outcomes = futures::stream::iter(sources)
            .map(|source| async move {
                let result = self.ingest_source(&source).await;
                IngestOutcome {
                    source_id: source.id,
                    source_name: source.name.clone(),
                    result: result.map_err(|e| e.to_string()),
                }
            })
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await;

        let report = IngestReport { outcomes };
        if report.failed() > 0 {
            warn!(
                "Guide ingestion finished with {} failed and {} successful sources",
                report.failed(),
                report.succeeded()
            );
        }
        Ok(report)
    }

    /// Delete a source, its stored data and its cached downloads
    pub async fn delete_source(&self, source_id: Uuid) -> AppResult<bool> {
        let deleted = self.database.delete_guide_source(source_id).await?;

        let xml = self.storage.source_cache_file(&source_id);
        let yml = xml.with_extension("yml");
        for path in [xml, yml] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Removed cached file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(deleted)
    }
}
