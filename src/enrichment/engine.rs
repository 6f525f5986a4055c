use crate::config::MetadataConfig;
use crate::database::Database;
use crate::enrichment::cache::TitleCache;
use crate::enrichment::providers::{
    non_blank, GoogleImageSearch, ImageSearch, MovieDetails, MovieSearch, TmdbClient,
};
use crate::errors::AppResult;
use crate::mapper::ChannelMapper;
use crate::models::Programme;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Counts from one enrichment run over the output channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub channels: usize,
    pub candidates: usize,
    pub updated: usize,
}

/// Fills missing programme metadata from external providers.
///
/// Clones share the same caches and request permits, so one engine should
/// be used for a whole run.
#[derive(Clone)]
pub struct EnrichmentEngine {
    movie_search: Option<Arc<dyn MovieSearch>>,
    image_search: Option<Arc<dyn ImageSearch>>,
    movie_cache: Arc<TitleCache<MovieDetails>>,
    image_cache: Arc<TitleCache<String>>,
    permits: Arc<Semaphore>,
}

impl EnrichmentEngine {
    pub fn new(
        movie_search: Option<Arc<dyn MovieSearch>>,
        image_search: Option<Arc<dyn ImageSearch>>,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            movie_search,
            image_search,
            movie_cache: Arc::new(TitleCache::new()),
            image_cache: Arc::new(TitleCache::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    pub fn from_config(config: &MetadataConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let movie_search: Option<Arc<dyn MovieSearch>> = if config.enable_tmdb_metadata {
            Some(Arc::new(TmdbClient::new(config.tmdb_api_key.clone(), timeout)?))
        } else {
            None
        };
        let image_search: Option<Arc<dyn ImageSearch>> =
            if config.enable_google_image_search_metadata {
                Some(Arc::new(GoogleImageSearch::new(timeout)?))
            } else {
                None
            };

        Ok(Self::new(
            movie_search,
            image_search,
            config.max_concurrent_requests,
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.movie_search.is_some() || self.image_search.is_some()
    }

    /// Enrich a batch concurrently, one task per programme.
    ///
    /// Output order matches input order. A task that fails leaves its
    /// programme as it was.
    pub async fn enrich(&self, programmes: Vec<Programme>) -> Vec<Programme> {
        if !self.is_enabled() {
            return programmes;
        }

        let handles: Vec<_> = programmes
            .iter()
            .cloned()
            .map(|programme| {
                let engine = self.clone();
                tokio::spawn(async move { engine.enrich_programme(programme).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        programmes
            .into_iter()
            .zip(results)
            .map(|(original, result)| match result {
                Ok(enriched) => enriched,
                Err(e) => {
                    error!("Error updating programme: {}", e);
                    original
                }
            })
            .collect()
    }

    async fn enrich_programme(&self, mut programme: Programme) -> Programme {
        if !programme.needs_enrichment() {
            return programme;
        }
        let Some(title) = programme.title.clone() else {
            return programme;
        };

        if let Some(search) = &self.movie_search {
            let details = self
                .movie_cache
                .get_or_fetch(&title, || self.lookup_movie(search.as_ref(), &title))
                .await;

            if let Some(details) = details {
                if programme.sub_title.is_none() {
                    programme.sub_title = details.title_text();
                }
                if programme.desc.is_none() {
                    programme.desc = details.overview_text();
                }
                if programme.icon_url.is_none() {
                    programme.icon_url = details.poster_url();
                }
            }
        }

        if programme.icon_url.is_none() {
            if let Some(search) = &self.image_search {
                programme.icon_url = self
                    .image_cache
                    .get_or_fetch(&title, || self.lookup_image(search.as_ref(), &title))
                    .await;
            }
        }

        programme
    }

    async fn lookup_movie(&self, search: &dyn MovieSearch, title: &str) -> Option<MovieDetails> {
        let _permit = self.permits.acquire().await.ok()?;
        match search.search_movie(title).await {
            Ok(found) => {
                debug!(
                    "Fetching data for programme '{}' from TMDB. [{}]",
                    title,
                    if found.is_some() { "FETCHED" } else { "NONE" }
                );
                found
            }
            Err(e) => {
                warn!("TMDB lookup for '{}' failed: {}", title, e);
                None
            }
        }
    }

    async fn lookup_image(&self, search: &dyn ImageSearch, title: &str) -> Option<String> {
        let _permit = self.permits.acquire().await.ok()?;
        match search.search_image(title).await {
            Ok(found) => {
                let found = non_blank(found.as_deref());
                debug!(
                    "Fetching data for programme '{}' from image search. [{}]",
                    title,
                    if found.is_some() { "FETCHED" } else { "NONE" }
                );
                found
            }
            Err(e) => {
                warn!("Image search for '{}' failed: {}", title, e);
                None
            }
        }
    }

    /// Enrich the programmes feeding every enabled output channel and store
    /// the changed ones, one transaction per guide channel.
    pub async fn enrich_output_channels(&self, database: &Database) -> AppResult<EnrichmentSummary> {
        let mut summary = EnrichmentSummary::default();
        if !self.is_enabled() {
            debug!("No metadata providers enabled, skipping enrichment");
            return Ok(summary);
        }

        let started = std::time::Instant::now();
        info!("Update EPG with missing data from online sources for each configured channel");

        let mapper = ChannelMapper::new(database.clone());
        let mut seen = HashSet::new();

        for channel in database.list_enabled_output_channels().await? {
            let Some(guide_channel) = mapper.resolve(&channel).await? else {
                continue;
            };
            if !seen.insert(guide_channel.id) {
                continue;
            }
            summary.channels += 1;

            let stored = database.programmes_for_guide_channel(guide_channel.id).await?;
            summary.candidates += stored
                .iter()
                .filter(|s| s.programme.needs_enrichment())
                .count();

            info!("Updating programme list for {} - {}", channel.number, channel.name);
            let (meta, programmes): (Vec<_>, Vec<_>) = stored
                .into_iter()
                .map(|s| ((s.id, s.guide_channel_id, s.source_id), s.programme))
                .unzip();
            let before = programmes.clone();
            let enriched = self.enrich(programmes).await;

            let changed: Vec<_> = meta
                .into_iter()
                .zip(before.iter().zip(enriched))
                .filter(|(_, (old, new))| {
                    old.sub_title != new.sub_title
                        || old.desc != new.desc
                        || old.icon_url != new.icon_url
                })
                .map(|((id, guide_channel_id, source_id), (_, programme))| {
                    crate::models::StoredProgramme {
                        id,
                        guide_channel_id,
                        source_id,
                        programme,
                    }
                })
                .collect();

            summary.updated += database.update_programme_metadata(&changed).await?;
        }

        info!(
            "Updating online EPG data for {} channels took {}s ({} programmes updated)",
            summary.channels,
            started.elapsed().as_secs(),
            summary.updated
        );
        Ok(summary)
    }
}
