//! Programme store
//!
//! A source's channels and programmes are only ever replaced as a whole.
//! [`SourceReplacement`] wraps one transaction: it deletes the previous rows
//! on creation, buffers inserts in fixed-size batches, and makes the new rows
//! visible on [`SourceReplacement::commit`]. Dropping it without committing
//! rolls everything back, so readers never see a partially replaced source.

use crate::database::get_uuid;
use crate::errors::AppResult;
use crate::models::*;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

const PROGRAMME_COLUMNS: &str = "id, guide_channel_id, source_id, channel_id, title, sub_title, description, series_desc, icon_url, country, start, stop, start_timestamp, stop_timestamp, categories, url, date, length, keywords, credits, episode_num_system, episode_num_value, rating_system, rating_value, star_rating, video_present, video_colour, video_aspect, video_quality, audio_present, audio_stereo, subtitles_type, audio_described, is_premiere, is_new, previously_shown, review_type, review_value";

/// Channels buffered before a flush
const CHANNEL_BATCH_SIZE: usize = 1000;

/// Columns bound per guide channel row
const CHANNEL_FIELDS: usize = 5;

/// A programme with its list columns already serialized
struct ProgrammeRow {
    id: String,
    guide_channel_id: String,
    categories: Option<String>,
    keywords: Option<String>,
    credits: Option<String>,
    programme: Programme,
}

impl ProgrammeRow {
    fn new(guide_channel_id: Uuid, programme: Programme) -> AppResult<Self> {
        let categories = if programme.categories.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&programme.categories)?)
        };
        let keywords = if programme.keywords.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&programme.keywords)?)
        };
        let credits = if programme.credits.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&programme.credits)?)
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            guide_channel_id: guide_channel_id.to_string(),
            categories,
            keywords,
            credits,
            programme,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned + Default>(
    raw: Option<String>,
) -> Result<T, sqlx::Error> {
    match raw {
        Some(text) => serde_json::from_str(&text).map_err(|e| sqlx::Error::Decode(Box::new(e))),
        None => Ok(T::default()),
    }
}

fn row_to_programme(row: &SqliteRow) -> Result<StoredProgramme, sqlx::Error> {
    let programme = Programme {
        channel_id: row.try_get("channel_id")?,
        start: row.try_get("start")?,
        stop: row.try_get("stop")?,
        start_timestamp: row.try_get("start_timestamp")?,
        stop_timestamp: row.try_get("stop_timestamp")?,
        title: row.try_get("title")?,
        sub_title: row.try_get("sub_title")?,
        desc: row.try_get("description")?,
        series_desc: row.try_get("series_desc")?,
        country: row.try_get("country")?,
        icon_url: row.try_get("icon_url")?,
        categories: decode_json(row.try_get("categories")?)?,
        keywords: decode_json(row.try_get("keywords")?)?,
        url: row.try_get("url")?,
        date: row.try_get("date")?,
        length: row.try_get("length")?,
        credits: decode_json(row.try_get("credits")?)?,
        episode_num_system: row.try_get("episode_num_system")?,
        episode_num_value: row.try_get("episode_num_value")?,
        rating_system: row.try_get("rating_system")?,
        rating_value: row.try_get("rating_value")?,
        star_rating: row.try_get("star_rating")?,
        video_present: row.try_get("video_present")?,
        video_colour: row.try_get("video_colour")?,
        video_aspect: row.try_get("video_aspect")?,
        video_quality: row.try_get("video_quality")?,
        audio_present: row.try_get("audio_present")?,
        audio_stereo: row.try_get("audio_stereo")?,
        subtitles_type: row.try_get("subtitles_type")?,
        audio_described: row.try_get("audio_described")?,
        is_premiere: row.try_get("is_premiere")?,
        is_new: row.try_get("is_new")?,
        previously_shown: row.try_get("previously_shown")?,
        review_type: row.try_get("review_type")?,
        review_value: row.try_get("review_value")?,
    };

    Ok(StoredProgramme {
        id: get_uuid(row, "id")?,
        guide_channel_id: get_uuid(row, "guide_channel_id")?,
        source_id: get_uuid(row, "source_id")?,
        programme,
    })
}

/// An open replacement of one source's channel and programme rows
pub struct SourceReplacement {
    tx: Transaction<'static, Sqlite>,
    source_id: Uuid,
    programme_batch_size: usize,
    rows_per_insert: usize,
    channel_ids: HashMap<String, Uuid>,
    channel_buffer: Vec<(Uuid, ChannelDecl)>,
    programme_buffer: Vec<ProgrammeRow>,
    /// Programmes that arrived before their channel was declared, capped at
    /// `programme_batch_size`
    unresolved: Vec<Programme>,
    /// Unresolved programmes dropped because the buffer was full
    overflowed: usize,
    channels_saved: usize,
    programmes_saved: usize,
    duplicate_channels: usize,
    /// Released after the transaction is committed or rolled back
    _write_guard: OwnedMutexGuard<()>,
}

impl SourceReplacement {
    /// Queue a channel declaration. Repeated ids keep the first declaration.
    pub async fn add_channel(&mut self, channel: ChannelDecl) -> AppResult<()> {
        if self.channel_ids.contains_key(&channel.id) {
            self.duplicate_channels += 1;
            return Ok(());
        }

        let id = Uuid::new_v4();
        self.channel_ids.insert(channel.id.clone(), id);
        self.channel_buffer.push((id, channel));

        if self.channel_buffer.len() >= CHANNEL_BATCH_SIZE {
            self.flush_channels().await?;
        }
        Ok(())
    }

    /// Queue a programme, resolving its upstream channel id
    pub async fn add_programme(&mut self, programme: Programme) -> AppResult<()> {
        match self.channel_ids.get(&programme.channel_id) {
            Some(guide_channel_id) => {
                let row = ProgrammeRow::new(*guide_channel_id, programme)?;
                self.programme_buffer.push(row);
                if self.programme_buffer.len() >= self.programme_batch_size {
                    self.flush_programmes().await?;
                }
            }
            None if self.unresolved.len() < self.programme_batch_size => {
                self.unresolved.push(programme)
            }
            None => {
                if self.overflowed == 0 {
                    warn!(
                        "Source {} declares more than {} programmes ahead of their channels, dropping the rest",
                        self.source_id, self.programme_batch_size
                    );
                }
                self.overflowed += 1;
            }
        }
        Ok(())
    }

    pub fn programmes_saved(&self) -> usize {
        self.programmes_saved + self.programme_buffer.len()
    }

    async fn flush_channels(&mut self) -> AppResult<()> {
        let buffer = std::mem::take(&mut self.channel_buffer);
        let rows_per_insert = crate::config::SQLITE_MAX_VARIABLES / CHANNEL_FIELDS;

        for chunk in buffer.chunks(rows_per_insert) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO guide_channels (id, source_id, channel_id, display_name, icon_url) ",
            );
            query_builder.push_values(chunk, |mut b, (id, channel)| {
                b.push_bind(id.to_string())
                    .push_bind(self.source_id.to_string())
                    .push_bind(&channel.id)
                    .push_bind(&channel.display_name)
                    .push_bind(&channel.icon_url);
            });
            query_builder.build().execute(&mut *self.tx).await?;
        }

        self.channels_saved += buffer.len();
        Ok(())
    }

    async fn flush_programmes(&mut self) -> AppResult<()> {
        // Programme rows reference guide channels, which must exist first
        if !self.channel_buffer.is_empty() {
            self.flush_channels().await?;
        }

        let buffer = std::mem::take(&mut self.programme_buffer);
        for chunk in buffer.chunks(self.rows_per_insert) {
            let mut query_builder = sqlx::QueryBuilder::new(format!(
                "INSERT INTO programmes ({PROGRAMME_COLUMNS}) "
            ));
            query_builder.push_values(chunk, |mut b, row| {
                let p = &row.programme;
                b.push_bind(&row.id)
                    .push_bind(&row.guide_channel_id)
                    .push_bind(self.source_id.to_string())
                    .push_bind(&p.channel_id)
                    .push_bind(&p.title)
                    .push_bind(&p.sub_title)
                    .push_bind(&p.desc)
                    .push_bind(&p.series_desc)
                    .push_bind(&p.icon_url)
                    .push_bind(&p.country)
                    .push_bind(&p.start)
                    .push_bind(&p.stop)
                    .push_bind(p.start_timestamp)
                    .push_bind(p.stop_timestamp)
                    .push_bind(&row.categories)
                    .push_bind(&p.url)
                    .push_bind(&p.date)
                    .push_bind(&p.length)
                    .push_bind(&row.keywords)
                    .push_bind(&row.credits)
                    .push_bind(&p.episode_num_system)
                    .push_bind(&p.episode_num_value)
                    .push_bind(&p.rating_system)
                    .push_bind(&p.rating_value)
                    .push_bind(&p.star_rating)
                    .push_bind(p.video_present)
                    .push_bind(p.video_colour)
                    .push_bind(&p.video_aspect)
                    .push_bind(&p.video_quality)
                    .push_bind(p.audio_present)
                    .push_bind(&p.audio_stereo)
                    .push_bind(&p.subtitles_type)
                    .push_bind(p.audio_described)
                    .push_bind(p.is_premiere)
                    .push_bind(p.is_new)
                    .push_bind(&p.previously_shown)
                    .push_bind(&p.review_type)
                    .push_bind(&p.review_value);
            });
            query_builder.build().execute(&mut *self.tx).await?;
        }

        self.programmes_saved += buffer.len();
        debug!(
            "Flushed {} programmes for source {} ({} total)",
            buffer.len(),
            self.source_id,
            self.programmes_saved
        );
        Ok(())
    }

    /// Insert whatever is still buffered and commit the replacement
    pub async fn commit(mut self) -> AppResult<IngestSummary> {
        let unresolved = std::mem::take(&mut self.unresolved);
        let mut orphaned = self.overflowed;
        for programme in unresolved {
            match self.channel_ids.get(&programme.channel_id) {
                Some(guide_channel_id) => {
                    let row = ProgrammeRow::new(*guide_channel_id, programme)?;
                    self.programme_buffer.push(row);
                }
                None => orphaned += 1,
            }
        }

        self.flush_channels().await?;
        self.flush_programmes().await?;

        if orphaned > 0 {
            warn!(
                "Discarded {} programmes for source {} referencing undeclared channels",
                orphaned, self.source_id
            );
        }
        if self.duplicate_channels > 0 {
            warn!(
                "Ignored {} duplicate channel declarations for source {}",
                self.duplicate_channels, self.source_id
            );
        }

        self.tx
            .commit()
            .await
            .map_err(|e| crate::errors::StorageError::Transaction {
                message: e.to_string(),
            })?;

        Ok(IngestSummary {
            channel_count: self.channels_saved,
            programme_count: self.programmes_saved,
            orphaned_programmes: orphaned,
        })
    }
}

impl crate::database::Database {
    /// Start replacing everything stored for `source_id`
    ///
    /// Replacements are serialized: this waits until any other open
    /// replacement has been committed or dropped.
    pub async fn begin_source_replacement(&self, source_id: Uuid) -> AppResult<SourceReplacement> {
        let write_guard = self.write_lock.clone().lock_owned().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM programmes WHERE source_id = ?")
            .bind(source_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM guide_channels WHERE source_id = ?")
            .bind(source_id.to_string())
            .execute(&mut *tx)
            .await?;

        Ok(SourceReplacement {
            tx,
            source_id,
            programme_batch_size: self.config.programme_batch_size.max(1),
            rows_per_insert: self.config.safe_programme_insert_rows(),
            channel_ids: HashMap::new(),
            channel_buffer: Vec::new(),
            programme_buffer: Vec::new(),
            unresolved: Vec::new(),
            overflowed: 0,
            channels_saved: 0,
            programmes_saved: 0,
            duplicate_channels: 0,
            _write_guard: write_guard,
        })
    }

    /// Replace a source's rows from fully decoded declarations
    pub async fn replace_source_data(
        &self,
        source_id: Uuid,
        channels: Vec<ChannelDecl>,
        programmes: Vec<Programme>,
    ) -> AppResult<IngestSummary> {
        let mut replacement = self.begin_source_replacement(source_id).await?;
        for channel in channels {
            replacement.add_channel(channel).await?;
        }
        for programme in programmes {
            replacement.add_programme(programme).await?;
        }
        replacement.commit().await
    }

    /// Remove a source's channels and programmes but keep the source itself
    pub async fn clear_source_data(&self, source_id: Uuid) -> AppResult<()> {
        self.begin_source_replacement(source_id)
            .await?
            .commit()
            .await?;
        Ok(())
    }

    /// Programmes of one guide channel ordered by start time
    pub async fn programmes_for_guide_channel(
        &self,
        guide_channel_id: Uuid,
    ) -> AppResult<Vec<StoredProgramme>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROGRAMME_COLUMNS} FROM programmes
             WHERE guide_channel_id = ?
             ORDER BY channel_id, start_timestamp, start, rowid"
        ))
        .bind(guide_channel_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut programmes = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_programme(row) {
                Ok(programme) => programmes.push(programme),
                Err(e) => {
                    let id: Option<String> = row.try_get("id").ok();
                    warn!(
                        "Skipping unreadable programme {} on guide channel {}: {}",
                        id.as_deref().unwrap_or("?"),
                        guide_channel_id,
                        e
                    );
                }
            }
        }
        Ok(programmes)
    }

    pub async fn count_programmes(&self, source_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM programmes WHERE source_id = ?")
            .bind(source_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Write back the enrichable fields of the given programmes in one transaction
    pub async fn update_programme_metadata(&self, programmes: &[StoredProgramme]) -> AppResult<usize> {
        if programmes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for stored in programmes {
            let result = sqlx::query(
                "UPDATE programmes SET sub_title = ?, description = ?, icon_url = ? WHERE id = ?",
            )
            .bind(&stored.programme.sub_title)
            .bind(&stored.programme.desc)
            .bind(&stored.programme.icon_url)
            .bind(stored.id.to_string())
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::models::*;

    async fn database_with_source() -> (Database, GuideSource) {
        let db = Database::new_in_memory().await.unwrap();
        let source = db
            .create_guide_source(&GuideSourceCreateRequest {
                name: "Test".to_string(),
                url: "http://example.com/guide.xml".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        (db, source)
    }

    fn channel(id: &str) -> ChannelDecl {
        ChannelDecl {
            id: id.to_string(),
            display_name: Some(format!("Channel {id}")),
            icon_url: None,
        }
    }

    fn programme(channel_id: &str, start: &str, title: &str) -> Programme {
        let mut p = Programme::new(channel_id);
        p.start = Some(start.to_string());
        p.title = Some(title.to_string());
        p.derive_timestamps();
        p
    }

    #[tokio::test]
    async fn test_replace_source_data_round_trips_rows() {
        let (db, source) = database_with_source().await;

        let mut news = programme("ch1", "20240101120000 +0000", "News");
        news.categories = vec!["News".to_string(), "Weather".to_string()];
        news.credits.push("presenter", "Huw".to_string());
        news.video_present = Some(true);
        news.is_new = true;

        let summary = db
            .replace_source_data(source.id, vec![channel("ch1")], vec![news.clone()])
            .await
            .unwrap();
        assert_eq!(summary.channel_count, 1);
        assert_eq!(summary.programme_count, 1);

        let guide_channel = db.find_guide_channel(source.id, "ch1").await.unwrap().unwrap();
        let stored = db.programmes_for_guide_channel(guide_channel.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].programme, news);
        assert_eq!(stored[0].source_id, source.id);
    }

    #[tokio::test]
    async fn test_empty_lists_are_stored_as_null() {
        let (db, source) = database_with_source().await;
        db.replace_source_data(
            source.id,
            vec![channel("ch1")],
            vec![programme("ch1", "20240101120000 +0000", "News")],
        )
        .await
        .unwrap();

        let raw: (Option<String>, Option<String>, Option<String>) =
            sqlx::query_as("SELECT categories, keywords, credits FROM programmes")
                .fetch_one(&db.pool())
                .await
                .unwrap();
        assert_eq!(raw, (None, None, None));
    }

    #[tokio::test]
    async fn test_orphans_dropped_and_forward_references_kept() {
        let (db, source) = database_with_source().await;

        let mut replacement = db.begin_source_replacement(source.id).await.unwrap();
        replacement
            .add_programme(programme("late", "20240101120000 +0000", "Early bird"))
            .await
            .unwrap();
        replacement.add_channel(channel("late")).await.unwrap();
        replacement
            .add_programme(programme("ghost", "20240101120000 +0000", "Orphan"))
            .await
            .unwrap();
        let summary = replacement.commit().await.unwrap();

        assert_eq!(summary.programme_count, 1);
        assert_eq!(summary.orphaned_programmes, 1);
        assert_eq!(db.count_programmes(source.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_replacement_leaves_previous_rows() {
        let (db, source) = database_with_source().await;
        db.replace_source_data(
            source.id,
            vec![channel("ch1")],
            vec![programme("ch1", "20240101120000 +0000", "News")],
        )
        .await
        .unwrap();

        {
            let mut replacement = db.begin_source_replacement(source.id).await.unwrap();
            replacement.add_channel(channel("other")).await.unwrap();
            // dropped without commit
        }

        assert_eq!(db.count_guide_channels(source.id).await.unwrap(), 1);
        assert_eq!(db.count_programmes(source.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_channel_declaration_keeps_first() {
        let (db, source) = database_with_source().await;
        let mut second = channel("ch1");
        second.display_name = Some("Impostor".to_string());

        db.replace_source_data(source.id, vec![channel("ch1"), second], vec![])
            .await
            .unwrap();

        let channels = db.list_guide_channels(source.id).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name.as_deref(), Some("Channel ch1"));
    }

    #[tokio::test]
    async fn test_programmes_ordered_by_start() {
        let (db, source) = database_with_source().await;
        db.replace_source_data(
            source.id,
            vec![channel("ch1")],
            vec![
                programme("ch1", "20240101140000 +0000", "Third"),
                programme("ch1", "20240101130000 +0100", "First"),
                programme("ch1", "20240101130000 +0000", "Second"),
            ],
        )
        .await
        .unwrap();

        let guide_channel = db.find_guide_channel(source.id, "ch1").await.unwrap().unwrap();
        let titles: Vec<_> = db
            .programmes_for_guide_channel(guide_channel.id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|p| p.programme.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_small_batches_flush_inside_one_transaction() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            programme_batch_size: 2,
            ..Default::default()
        };
        let db = Database::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        let source = db
            .create_guide_source(&GuideSourceCreateRequest {
                name: "Batched".to_string(),
                url: "http://example.com".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        let programmes: Vec<_> = (0..7)
            .map(|i| programme("ch1", &format!("2024010112{:02}00 +0000", i), "Slot"))
            .collect();
        let summary = db
            .replace_source_data(source.id, vec![channel("ch1")], programmes)
            .await
            .unwrap();

        assert_eq!(summary.programme_count, 7);
        assert_eq!(db.count_programmes(source.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_update_programme_metadata() {
        let (db, source) = database_with_source().await;
        db.replace_source_data(
            source.id,
            vec![channel("ch1")],
            vec![programme("ch1", "20240101120000 +0000", "Film")],
        )
        .await
        .unwrap();

        let guide_channel = db.find_guide_channel(source.id, "ch1").await.unwrap().unwrap();
        let mut stored = db.programmes_for_guide_channel(guide_channel.id).await.unwrap();
        stored[0].programme.desc = Some("Now with a synopsis".to_string());

        assert_eq!(db.update_programme_metadata(&stored).await.unwrap(), 1);
        let reloaded = db.programmes_for_guide_channel(guide_channel.id).await.unwrap();
        assert_eq!(reloaded[0].programme.desc.as_deref(), Some("Now with a synopsis"));
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_skipped() {
        let (db, source) = database_with_source().await;
        db.replace_source_data(
            source.id,
            vec![channel("ch1")],
            vec![
                programme("ch1", "20240101120000 +0000", "Broken"),
                programme("ch1", "20240101130000 +0000", "Fine"),
            ],
        )
        .await
        .unwrap();

        sqlx::query("UPDATE programmes SET credits = '{oops' WHERE title = 'Broken'")
            .execute(&db.pool())
            .await
            .unwrap();

        let guide_channel = db.find_guide_channel(source.id, "ch1").await.unwrap().unwrap();
        let stored = db.programmes_for_guide_channel(guide_channel.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].programme.title.as_deref(), Some("Fine"));
    }

    #[tokio::test]
    async fn test_forward_reference_buffer_is_bounded() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            programme_batch_size: 2,
            ..Default::default()
        };
        let db = Database::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        let source = db
            .create_guide_source(&GuideSourceCreateRequest {
                name: "Backwards".to_string(),
                url: "http://example.com".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        let mut replacement = db.begin_source_replacement(source.id).await.unwrap();
        for hour in 10..15 {
            replacement
                .add_programme(programme("late", &format!("20240101{hour}0000 +0000"), "Early"))
                .await
                .unwrap();
        }
        replacement.add_channel(channel("late")).await.unwrap();
        replacement
            .add_programme(programme("late", "20240101200000 +0000", "On time"))
            .await
            .unwrap();
        let summary = replacement.commit().await.unwrap();

        assert_eq!(summary.programme_count, 3);
        assert_eq!(summary.orphaned_programmes, 3);
        assert_eq!(db.count_programmes(source.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_replacements_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("guide.db").display()),
            ..Default::default()
        };
        let db = Database::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        let mut sources = Vec::new();
        for name in ["A", "B"] {
            sources.push(
                db.create_guide_source(&GuideSourceCreateRequest {
                    name: name.to_string(),
                    url: format!("http://example.com/{name}.xml"),
                    enabled: true,
                })
                .await
                .unwrap(),
            );
        }

        let mut first = db.begin_source_replacement(sources[0].id).await.unwrap();
        first.add_channel(channel("a1")).await.unwrap();

        let waiting_db = db.clone();
        let second_id = sources[1].id;
        let second = tokio::spawn(async move {
            let mut replacement = waiting_db.begin_source_replacement(second_id).await?;
            replacement.add_channel(channel("b1")).await?;
            replacement.commit().await
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();
        let summary = second.await.unwrap().unwrap();
        assert_eq!(summary.channel_count, 1);
        assert_eq!(db.count_guide_channels(sources[0].id).await.unwrap(), 1);
        assert_eq!(db.count_guide_channels(sources[1].id).await.unwrap(), 1);
    }
}
