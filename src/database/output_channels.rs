use crate::database::get_uuid;
use crate::errors::{AppError, AppResult};
use crate::models::*;
use crate::utils::datetime::{format_for_storage, parse_storage_datetime};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

const CHANNEL_COLUMNS: &str =
    "id, enabled, name, number, logo_mime, guide_source_id, guide_channel_id, created_at, updated_at";

fn row_to_output_channel(row: &SqliteRow) -> Result<OutputChannel, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let guide_source_id: Option<String> = row.try_get("guide_source_id")?;
    let guide_channel_id: Option<String> = row.try_get("guide_channel_id")?;

    let guide = match (guide_source_id, guide_channel_id) {
        (Some(source_id), Some(channel_id)) => Some(GuideMapping {
            source_id: Uuid::parse_str(&source_id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            channel_id,
        }),
        _ => None,
    };

    Ok(OutputChannel {
        id: get_uuid(row, "id")?,
        enabled: row.try_get("enabled")?,
        name: row.try_get("name")?,
        number: row.try_get("number")?,
        logo_mime: row.try_get("logo_mime")?,
        guide,
        tags: Vec::new(),
        created_at: parse_storage_datetime(&created_at)?,
        updated_at: parse_storage_datetime(&updated_at)?,
    })
}

async fn write_tags(
    tx: &mut Transaction<'static, Sqlite>,
    channel_id: Uuid,
    tags: &[String],
) -> AppResult<()> {
    sqlx::query("DELETE FROM output_channel_tags WHERE channel_id = ?")
        .bind(channel_id.to_string())
        .execute(&mut **tx)
        .await?;

    let mut position = 0i64;
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        sqlx::query("INSERT INTO output_channel_tags (channel_id, position, tag) VALUES (?, ?, ?)")
            .bind(channel_id.to_string())
            .bind(position)
            .bind(tag)
            .execute(&mut **tx)
            .await?;
        position += 1;
    }
    Ok(())
}

impl crate::database::Database {
    pub async fn create_output_channel(
        &self,
        request: &OutputChannelCreateRequest,
    ) -> AppResult<OutputChannel> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("channel name must not be empty"));
        }

        let id = Uuid::new_v4();
        let now = format_for_storage(&Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO output_channels ({CHANNEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(id.to_string())
        .bind(request.enabled)
        .bind(request.name.trim())
        .bind(request.number)
        .bind(&request.logo_mime)
        .bind(request.guide.as_ref().map(|g| g.source_id.to_string()))
        .bind(request.guide.as_ref().map(|g| g.channel_id.clone()))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        write_tags(&mut tx, id, &request.tags).await?;
        tx.commit().await?;

        info!("Created output channel {} '{}'", request.number, request.name);

        self.get_output_channel(id)
            .await?
            .ok_or_else(|| AppError::not_found("channel", id))
    }

    pub async fn get_output_channel(&self, id: Uuid) -> AppResult<Option<OutputChannel>> {
        let row = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM output_channels WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut channel = row_to_output_channel(&row)?;
        channel.tags = sqlx::query_scalar(
            "SELECT tag FROM output_channel_tags WHERE channel_id = ? ORDER BY position",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(channel))
    }

    /// All output channels ordered by channel number
    pub async fn list_output_channels(&self) -> AppResult<Vec<OutputChannel>> {
        self.query_output_channels(false).await
    }

    /// Enabled output channels ordered by channel number
    pub async fn list_enabled_output_channels(&self) -> AppResult<Vec<OutputChannel>> {
        self.query_output_channels(true).await
    }

    async fn query_output_channels(&self, enabled_only: bool) -> AppResult<Vec<OutputChannel>> {
        let filter = if enabled_only { "WHERE enabled = 1" } else { "" };
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM output_channels {filter} ORDER BY number, rowid"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut channels = rows
            .iter()
            .map(row_to_output_channel)
            .collect::<Result<Vec<_>, _>>()?;

        let tag_rows = sqlx::query(
            "SELECT channel_id, tag FROM output_channel_tags ORDER BY channel_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in &tag_rows {
            let channel_id = get_uuid(row, "channel_id")?;
            tags.entry(channel_id).or_default().push(row.try_get("tag")?);
        }

        for channel in &mut channels {
            if let Some(channel_tags) = tags.remove(&channel.id) {
                channel.tags = channel_tags;
            }
        }

        Ok(channels)
    }

    /// Replace the ordered tag list of a channel
    pub async fn set_output_channel_tags(&self, id: Uuid, tags: &[String]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let touched = sqlx::query("UPDATE output_channels SET updated_at = ? WHERE id = ?")
            .bind(format_for_storage(&Utc::now()))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(AppError::not_found("channel", id));
        }

        write_tags(&mut tx, id, tags).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Point a channel at an upstream guide channel, or clear the mapping
    pub async fn set_output_channel_guide(
        &self,
        id: Uuid,
        guide: Option<&GuideMapping>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE output_channels SET guide_source_id = ?, guide_channel_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(guide.map(|g| g.source_id.to_string()))
        .bind(guide.map(|g| g.channel_id.clone()))
        .bind(format_for_storage(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("channel", id));
        }
        Ok(())
    }

    pub async fn delete_output_channel(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM output_channels WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::models::*;
    use uuid::Uuid;

    fn request(name: &str, number: i64) -> OutputChannelCreateRequest {
        OutputChannelCreateRequest {
            name: name.to_string(),
            number,
            enabled: true,
            logo_mime: None,
            guide: None,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_channels_listed_by_number() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_output_channel(&request("Two", 102)).await.unwrap();
        db.create_output_channel(&request("One", 101)).await.unwrap();
        let mut disabled = request("Off", 100);
        disabled.enabled = false;
        db.create_output_channel(&disabled).await.unwrap();

        let all: Vec<_> = db
            .list_output_channels()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(all, vec![100, 101, 102]);

        let enabled: Vec<_> = db
            .list_enabled_output_channels()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(enabled, vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn test_tags_keep_order() {
        let db = Database::new_in_memory().await.unwrap();
        let mut req = request("Sports", 200);
        req.tags = vec!["Sport".to_string(), " HD ".to_string(), "".to_string()];
        let channel = db.create_output_channel(&req).await.unwrap();
        assert_eq!(channel.tags, vec!["Sport", "HD"]);

        db.set_output_channel_tags(channel.id, &["UK".to_string(), "Sport".to_string()])
            .await
            .unwrap();
        let listed = db.list_output_channels().await.unwrap();
        assert_eq!(listed[0].tags, vec!["UK", "Sport"]);
    }

    #[tokio::test]
    async fn test_guide_mapping_round_trip() {
        let db = Database::new_in_memory().await.unwrap();
        let source_id = Uuid::new_v4();
        let mut req = request("BBC One", 101);
        req.guide = Some(GuideMapping {
            source_id,
            channel_id: "ch1".to_string(),
        });

        let channel = db.create_output_channel(&req).await.unwrap();
        assert_eq!(channel.guide, req.guide);

        db.set_output_channel_guide(channel.id, None).await.unwrap();
        let fetched = db.get_output_channel(channel.id).await.unwrap().unwrap();
        assert!(fetched.guide.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_missing_channel() {
        let db = Database::new_in_memory().await.unwrap();
        let channel = db.create_output_channel(&request("Gone", 1)).await.unwrap();

        assert!(db.delete_output_channel(channel.id).await.unwrap());
        assert!(!db.delete_output_channel(channel.id).await.unwrap());
        assert!(db
            .set_output_channel_tags(channel.id, &["x".to_string()])
            .await
            .is_err());
    }
}
