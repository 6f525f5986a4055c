use crate::database::get_uuid;
use crate::errors::{AppError, AppResult};
use crate::models::*;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn row_to_guide_channel(row: &SqliteRow) -> Result<GuideChannel, sqlx::Error> {
    Ok(GuideChannel {
        id: get_uuid(row, "id")?,
        source_id: get_uuid(row, "source_id")?,
        channel_id: row.try_get("channel_id")?,
        display_name: row.try_get("display_name")?,
        icon_url: row.try_get("icon_url")?,
    })
}

impl crate::database::Database {
    /// Upstream channels of one source, in declaration order
    pub async fn list_guide_channels(&self, source_id: Uuid) -> AppResult<Vec<GuideChannel>> {
        let rows = sqlx::query(
            "SELECT id, source_id, channel_id, display_name, icon_url
             FROM guide_channels WHERE source_id = ? ORDER BY rowid",
        )
        .bind(source_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row_to_guide_channel(row).map_err(AppError::from))
            .collect()
    }

    /// Upstream channels of every source, grouped by source in configuration order
    pub async fn list_all_guide_channels(&self) -> AppResult<Vec<(GuideSource, Vec<GuideChannel>)>> {
        let mut grouped = Vec::new();
        for source in self.list_guide_sources().await? {
            let channels = self.list_guide_channels(source.id).await?;
            grouped.push((source, channels));
        }
        Ok(grouped)
    }

    /// Look up the guide channel declared as `channel_id` by `source_id`
    pub async fn find_guide_channel(
        &self,
        source_id: Uuid,
        channel_id: &str,
    ) -> AppResult<Option<GuideChannel>> {
        let row = sqlx::query(
            "SELECT id, source_id, channel_id, display_name, icon_url
             FROM guide_channels WHERE source_id = ? AND channel_id = ?
             ORDER BY rowid LIMIT 1",
        )
        .bind(source_id.to_string())
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_guide_channel).transpose()?)
    }

    pub async fn count_guide_channels(&self, source_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM guide_channels WHERE source_id = ?")
            .bind(source_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
