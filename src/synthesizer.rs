//! Merged guide synthesis
//!
//! Walks the enabled output channels, pulls the programmes of each mapped
//! guide channel and writes one XMLTV document that references output
//! channel numbers rather than upstream ids.

use crate::config::{StorageConfig, SynthesisConfig};
use crate::database::Database;
use crate::errors::AppResult;
use crate::mapper::ChannelMapper;
use crate::models::ChannelDecl;
use crate::utils::logo::channel_logo_url;
use crate::xmltv::{EncodeOptions, XmltvWriter};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Counts from the last build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisSummary {
    pub channels: usize,
    pub programmes: usize,
    pub unmapped_channels: usize,
}

#[derive(Clone)]
pub struct EpgSynthesizer {
    database: Database,
    mapper: ChannelMapper,
    config: SynthesisConfig,
    output_file: PathBuf,
}

impl EpgSynthesizer {
    pub fn new(database: Database, config: SynthesisConfig, storage: &StorageConfig) -> Self {
        Self {
            mapper: ChannelMapper::new(database.clone()),
            database,
            config,
            output_file: storage.output_file(),
        }
    }

    pub fn output_file(&self) -> &PathBuf {
        &self.output_file
    }

    /// Build the merged guide and atomically replace the output file with it
    pub async fn build(&self) -> AppResult<SynthesisSummary> {
        let cache_buster = Utc::now().timestamp_millis().to_string();
        let (document, summary) = self.render(&cache_buster).await?;
        self.write_output(document.as_bytes()).await?;

        info!(
            "Wrote guide for {} channels with {} programmes to {}",
            summary.channels,
            summary.programmes,
            self.output_file.display()
        );
        Ok(summary)
    }

    /// Render the merged guide without writing it
    pub async fn build_document_with_cache_buster(&self, cache_buster: &str) -> AppResult<String> {
        let (document, _) = self.render(cache_buster).await?;
        Ok(document)
    }

    async fn render(&self, cache_buster: &str) -> AppResult<(String, SynthesisSummary)> {
        let options = EncodeOptions {
            generator_info_name: self.config.generator_info_name.clone(),
            source_info_name: self.config.source_info_name.clone(),
            mark_channels_live: true,
        };
        let mut writer = XmltvWriter::new(&options);
        let mut summary = SynthesisSummary::default();

        let channels = self.database.list_enabled_output_channels().await?;
        let yield_delay = Duration::from_millis(self.config.channel_yield_ms);

        for (index, channel) in channels.iter().enumerate() {
            if index > 0 && !yield_delay.is_zero() {
                tokio::time::sleep(yield_delay).await;
            }

            let guide_id = channel.guide_id();
            writer.write_channel(&ChannelDecl {
                id: guide_id.clone(),
                display_name: Some(channel.name.clone()),
                icon_url: Some(channel_logo_url(
                    &self.config.app_url,
                    channel.id,
                    cache_buster,
                    channel.logo_mime.as_deref(),
                )),
            });
            summary.channels += 1;

            let Some(guide_channel) = self.mapper.resolve(channel).await? else {
                summary.unmapped_channels += 1;
                continue;
            };

            let programmes = self
                .database
                .programmes_for_guide_channel(guide_channel.id)
                .await?;
            info!(
                "Channel {} '{}': {} programmes from '{}'",
                channel.number,
                channel.name,
                programmes.len(),
                guide_channel.channel_id
            );

            for stored in &programmes {
                writer.write_programme(&guide_id, &stored.programme, &channel.tags);
            }
            summary.programmes += programmes.len();
        }

        Ok((writer.finish(), summary))
    }

    async fn write_output(&self, bytes: &[u8]) -> AppResult<()> {
        if let Some(parent) = self.output_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.output_file.with_extension("xml.tmp");
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &self.output_file).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::xmltv::decode_bytes;

    struct Fixture {
        db: Database,
        source: GuideSource,
        _dir: tempfile::TempDir,
        synthesizer: EpgSynthesizer,
    }

    async fn fixture() -> Fixture {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            data_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let config = SynthesisConfig {
            channel_yield_ms: 0,
            ..Default::default()
        };
        let source = db
            .create_guide_source(&GuideSourceCreateRequest {
                name: "UK".to_string(),
                url: "http://example.com/uk.xml".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        let mut news = Programme::new("ch1");
        news.start = Some("20240101120000 +0000".to_string());
        news.stop = Some("20240101130000 +0000".to_string());
        news.title = Some("News".to_string());
        news.categories = vec!["News".to_string()];
        news.derive_timestamps();

        db.replace_source_data(
            source.id,
            vec![ChannelDecl {
                id: "ch1".to_string(),
                display_name: Some("BBC One".to_string()),
                icon_url: Some("http://upstream/bbc1.png".to_string()),
            }],
            vec![news],
        )
        .await
        .unwrap();

        Fixture {
            synthesizer: EpgSynthesizer::new(db.clone(), config, &storage),
            db,
            source,
            _dir: dir,
        }
    }

    async fn add_channel(
        db: &Database,
        name: &str,
        number: i64,
        guide: Option<GuideMapping>,
        tags: &[&str],
    ) -> OutputChannel {
        db.create_output_channel(&OutputChannelCreateRequest {
            name: name.to_string(),
            number,
            enabled: true,
            logo_mime: None,
            guide,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
        .await
        .unwrap()
    }

    fn mapping(source: &GuideSource, channel_id: &str) -> Option<GuideMapping> {
        Some(GuideMapping {
            source_id: source.id,
            channel_id: channel_id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_programmes_published_under_output_number() {
        let f = fixture().await;
        let channel = add_channel(&f.db, "BBC One", 101, mapping(&f.source, "ch1"), &[]).await;

        let xml = f.synthesizer.build_document_with_cache_buster("42").await.unwrap();
        assert!(xml.contains("<tv generator-info-name=\"TVH-IPTV-Config\""));
        assert!(xml.contains("<programme start=\"20240101120000 +0000\""));
        assert!(xml.contains("channel=\"101\">"));
        assert!(xml.contains("<title>News</title>"));
        assert!(!xml.contains("channel=\"ch1\""));
        assert!(xml.contains(&format!(
            "<icon src=\"http://localhost:9985/tic-api/channels/{}/logo/42.png\"/>",
            channel.id
        )));
        assert!(!xml.contains("upstream/bbc1.png"));
    }

    #[tokio::test]
    async fn test_tags_become_categories_and_outputs_share_a_feed() {
        let f = fixture().await;
        add_channel(&f.db, "BBC One", 101, mapping(&f.source, "ch1"), &["UK", "HD"]).await;
        add_channel(&f.db, "BBC One +1", 102, mapping(&f.source, "ch1"), &[]).await;

        let xml = f.synthesizer.build_document_with_cache_buster("1").await.unwrap();
        let document = decode_bytes(xml.as_bytes()).unwrap();

        let ids: Vec<_> = document.channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102"]);
        assert_eq!(document.programmes.len(), 2);
        assert_eq!(document.programmes[0].categories, vec!["News", "UK", "HD"]);
        assert_eq!(document.programmes[1].channel_id, "102");
        assert_eq!(document.programmes[1].categories, vec!["News"]);
    }

    #[tokio::test]
    async fn test_disabled_and_unmapped_channels() {
        let f = fixture().await;
        add_channel(&f.db, "BBC One", 101, mapping(&f.source, "ch1"), &[]).await;
        add_channel(&f.db, "Gone", 50, mapping(&f.source, "missing"), &[]).await;
        f.db.create_output_channel(&OutputChannelCreateRequest {
            name: "Off".to_string(),
            number: 1,
            enabled: false,
            logo_mime: None,
            guide: mapping(&f.source, "ch1"),
            tags: Vec::new(),
        })
        .await
        .unwrap();

        let summary = f.synthesizer.build().await.unwrap();
        assert_eq!(
            summary,
            SynthesisSummary {
                channels: 2,
                programmes: 1,
                unmapped_channels: 1,
            }
        );

        let written = std::fs::read_to_string(f.synthesizer.output_file()).unwrap();
        let document = decode_bytes(written.as_bytes()).unwrap();
        assert_eq!(document.programmes.len(), 1);
        assert_eq!(document.programmes[0].channel_id, "101");
        assert!(!written.contains("Off"));
    }

    #[tokio::test]
    async fn test_build_is_idempotent_for_fixed_cache_buster() {
        let f = fixture().await;
        add_channel(&f.db, "BBC One", 101, mapping(&f.source, "ch1"), &["UK"]).await;

        let first = f.synthesizer.build_document_with_cache_buster("7").await.unwrap();
        let second = f.synthesizer.build_document_with_cache_buster("7").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_deleted_source_leaves_channel_empty() {
        let f = fixture().await;
        add_channel(&f.db, "BBC One", 101, mapping(&f.source, "ch1"), &[]).await;
        f.db.delete_guide_source(f.source.id).await.unwrap();

        let xml = f.synthesizer.build_document_with_cache_buster("1").await.unwrap();
        let document = decode_bytes(xml.as_bytes()).unwrap();
        assert_eq!(document.channels.len(), 1);
        assert!(document.programmes.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_programme_does_not_abort_build() {
        let f = fixture().await;
        let other = f
            .db
            .create_guide_source(&GuideSourceCreateRequest {
                name: "Other".to_string(),
                url: "http://example.com/other.xml".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        let mut film = Programme::new("ch2");
        film.start = Some("20240101200000 +0000".to_string());
        film.title = Some("Film".to_string());
        film.derive_timestamps();
        f.db.replace_source_data(
            other.id,
            vec![ChannelDecl {
                id: "ch2".to_string(),
                display_name: None,
                icon_url: None,
            }],
            vec![film],
        )
        .await
        .unwrap();

        add_channel(&f.db, "BBC One", 101, mapping(&f.source, "ch1"), &[]).await;
        add_channel(&f.db, "Movies", 102, mapping(&other, "ch2"), &[]).await;

        sqlx::query("UPDATE programmes SET categories = 'not json' WHERE source_id = ?")
            .bind(f.source.id.to_string())
            .execute(&f.db.pool())
            .await
            .unwrap();

        let summary = f.synthesizer.build().await.unwrap();
        assert_eq!(summary.channels, 2);
        assert_eq!(summary.programmes, 1);

        let written = std::fs::read_to_string(f.synthesizer.output_file()).unwrap();
        let document = decode_bytes(written.as_bytes()).unwrap();
        assert_eq!(document.programmes.len(), 1);
        assert_eq!(document.programmes[0].channel_id, "102");
        assert_eq!(document.programmes[0].title.as_deref(), Some("Film"));
    }
}
