use crate::database::get_uuid;
use crate::errors::{AppError, AppResult};
use crate::models::*;
use crate::utils::datetime::{format_for_storage, parse_storage_datetime};
use crate::utils::normalize_url_scheme;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

const SOURCE_COLUMNS: &str =
    "id, name, url, enabled, created_at, updated_at, last_ingested_at";

fn row_to_source(row: &SqliteRow) -> Result<GuideSource, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let last_ingested_at: Option<String> = row.try_get("last_ingested_at")?;

    Ok(GuideSource {
        id: get_uuid(row, "id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        enabled: row.try_get("enabled")?,
        created_at: parse_storage_datetime(&created_at)?,
        updated_at: parse_storage_datetime(&updated_at)?,
        last_ingested_at: last_ingested_at
            .as_deref()
            .map(parse_storage_datetime)
            .transpose()?,
    })
}

impl crate::database::Database {
    /// All sources in configuration (creation) order
    pub async fn list_guide_sources(&self) -> AppResult<Vec<GuideSource>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM guide_sources ORDER BY created_at, rowid"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row_to_source(row).map_err(AppError::from))
            .collect()
    }

    pub async fn get_guide_source(&self, id: Uuid) -> AppResult<Option<GuideSource>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM guide_sources WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_source).transpose()?)
    }

    pub async fn create_guide_source(
        &self,
        request: &GuideSourceCreateRequest,
    ) -> AppResult<GuideSource> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("guide source name must not be empty"));
        }
        if request.url.trim().is_empty() {
            return Err(AppError::validation("guide source url must not be empty"));
        }

        let id = Uuid::new_v4();
        let now = format_for_storage(&Utc::now());

        sqlx::query(
            "INSERT INTO guide_sources (id, name, url, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(request.name.trim())
        .bind(normalize_url_scheme(&request.url))
        .bind(request.enabled)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!("Created guide source '{}' ({})", request.name, id);

        self.get_guide_source(id)
            .await?
            .ok_or_else(|| AppError::not_found("guide source", id))
    }

    pub async fn update_guide_source(
        &self,
        id: Uuid,
        request: &GuideSourceUpdateRequest,
    ) -> AppResult<GuideSource> {
        let result = sqlx::query(
            "UPDATE guide_sources SET name = ?, url = ?, enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(request.name.trim())
        .bind(normalize_url_scheme(&request.url))
        .bind(request.enabled)
        .bind(format_for_storage(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("guide source", id));
        }

        self.get_guide_source(id)
            .await?
            .ok_or_else(|| AppError::not_found("guide source", id))
    }

    /// Delete a source together with its channels and programmes.
    ///
    /// Returns false if the source did not exist.
    pub async fn delete_guide_source(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM programmes WHERE source_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM guide_channels WHERE source_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM guide_sources WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_guide_source_last_ingested(&self, id: Uuid) -> AppResult<()> {
        let now = format_for_storage(&Utc::now());
        sqlx::query("UPDATE guide_sources SET last_ingested_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::models::*;

    fn request(name: &str) -> GuideSourceCreateRequest {
        GuideSourceCreateRequest {
            name: name.to_string(),
            url: "example.com/guide.xml".to_string(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_guide_source_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();

        let created = db.create_guide_source(&request("Freeview")).await.unwrap();
        assert_eq!(created.url, "http://example.com/guide.xml");
        assert!(created.enabled);
        assert!(created.last_ingested_at.is_none());

        let updated = db
            .update_guide_source(
                created.id,
                &GuideSourceUpdateRequest {
                    name: "Freeview UK".to_string(),
                    url: "https://example.com/uk.xml".to_string(),
                    enabled: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Freeview UK");
        assert!(!updated.enabled);

        db.update_guide_source_last_ingested(created.id).await.unwrap();
        let fetched = db.get_guide_source(created.id).await.unwrap().unwrap();
        assert!(fetched.last_ingested_at.is_some());

        assert!(db.delete_guide_source(created.id).await.unwrap());
        assert!(db.get_guide_source(created.id).await.unwrap().is_none());
        assert!(!db.delete_guide_source(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sources_listed_in_creation_order() {
        let db = Database::new_in_memory().await.unwrap();
        let first = db.create_guide_source(&request("B source")).await.unwrap();
        let second = db.create_guide_source(&request("A source")).await.unwrap();

        let ids: Vec<_> = db
            .list_guide_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db.create_guide_source(&request("  ")).await.is_err());
    }
}
