//! Resolution of output channels to the upstream guide channel that feeds them

use crate::database::Database;
use crate::errors::AppResult;
use crate::models::{GuideChannel, OutputChannel};
use tracing::debug;

#[derive(Clone)]
pub struct ChannelMapper {
    database: Database,
}

impl ChannelMapper {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Find the guide channel an output channel is mapped to.
    ///
    /// An unmapped channel, a deleted source or an upstream id missing from
    /// the source's latest ingestion all resolve to `None`.
    pub async fn resolve(&self, channel: &OutputChannel) -> AppResult<Option<GuideChannel>> {
        let Some(mapping) = &channel.guide else {
            debug!("Channel {} '{}' has no guide mapping", channel.number, channel.name);
            return Ok(None);
        };

        let resolved = self
            .database
            .find_guide_channel(mapping.source_id, &mapping.channel_id)
            .await?;

        if resolved.is_none() {
            debug!(
                "Channel {} '{}' maps to '{}' in source {}, which is not present",
                channel.number, channel.name, mapping.channel_id, mapping.source_id
            );
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use uuid::Uuid;

    async fn output_channel(db: &Database, guide: Option<GuideMapping>) -> OutputChannel {
        db.create_output_channel(&OutputChannelCreateRequest {
            name: "BBC One".to_string(),
            number: 101,
            enabled: true,
            logo_mime: None,
            guide,
            tags: Vec::new(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_declared_channel() {
        let db = Database::new_in_memory().await.unwrap();
        let source = db
            .create_guide_source(&GuideSourceCreateRequest {
                name: "UK".to_string(),
                url: "http://example.com/uk.xml".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        db.replace_source_data(
            source.id,
            vec![ChannelDecl {
                id: "ch1".to_string(),
                display_name: Some("BBC One".to_string()),
                icon_url: None,
            }],
            vec![],
        )
        .await
        .unwrap();

        let channel = output_channel(
            &db,
            Some(GuideMapping {
                source_id: source.id,
                channel_id: "ch1".to_string(),
            }),
        )
        .await;

        let mapper = ChannelMapper::new(db.clone());
        let guide_channel = mapper.resolve(&channel).await.unwrap().unwrap();
        assert_eq!(guide_channel.channel_id, "ch1");
        assert_eq!(guide_channel.source_id, source.id);
    }

    #[tokio::test]
    async fn test_mapping_gaps_resolve_to_none() {
        let db = Database::new_in_memory().await.unwrap();
        let mapper = ChannelMapper::new(db.clone());

        let unmapped = output_channel(&db, None).await;
        assert!(mapper.resolve(&unmapped).await.unwrap().is_none());

        let dangling = output_channel(
            &db,
            Some(GuideMapping {
                source_id: Uuid::new_v4(),
                channel_id: "ch1".to_string(),
            }),
        )
        .await;
        assert!(mapper.resolve(&dangling).await.unwrap().is_none());
    }
}
