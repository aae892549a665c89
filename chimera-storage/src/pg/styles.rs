use super::{decode_err, query_err, PgStore};
use crate::traits::{StorageResult, StyleStore};
use chimera_core::{StorageError, StyleVersion};
use tokio_postgres::Row;
use uuid::Uuid;

const STYLE_COLUMNS: &str = "id, name, description, bundle, is_active, created_at";

fn row_to_version(row: &Row) -> StorageResult<StyleVersion> {
    let bundle: serde_json::Value = row.get("bundle");
    Ok(StyleVersion {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        bundle: serde_json::from_value(bundle).map_err(|e| decode_err("style_version", e))?,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl StyleStore for PgStore {
    async fn list_versions(&self) -> StorageResult<Vec<StyleVersion>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &*format!(
                    "SELECT {} FROM style_versions ORDER BY created_at DESC",
                    STYLE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(query_err("style_list"))?;
        rows.iter().map(row_to_version).collect()
    }

    async fn active_version(&self) -> StorageResult<Option<StyleVersion>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &*format!(
                    "SELECT {} FROM style_versions WHERE is_active \
                     ORDER BY created_at DESC LIMIT 1",
                    STYLE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(query_err("style_active"))?;
        row.as_ref().map(row_to_version).transpose()
    }

    async fn insert_version(&self, version: &StyleVersion) -> StorageResult<()> {
        let bundle =
            serde_json::to_value(&version.bundle).map_err(|e| decode_err("style_version", e))?;
        let conn = self.get_conn().await?;
        conn.execute(
            &*format!(
                "INSERT INTO style_versions ({}) VALUES ($1, $2, $3, $4, $5, $6)",
                STYLE_COLUMNS
            ),
            &[
                &version.id,
                &version.name,
                &version.description,
                &bundle,
                &version.is_active,
                &version.created_at,
            ],
        )
        .await
        .map_err(query_err("style_insert"))?;
        Ok(())
    }

    async fn activate(&self, id: Uuid) -> StorageResult<()> {
        let mut conn = self.get_conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| StorageError::TransactionFailed {
                reason: e.to_string(),
            })?;

        let exists = tx
            .query_opt("SELECT 1 FROM style_versions WHERE id = $1 FOR UPDATE", &[&id])
            .await
            .map_err(query_err("style_activate"))?;
        if exists.is_none() {
            return Err(StorageError::NotFound {
                entity: "style_version".to_string(),
                id: id.to_string(),
            });
        }

        tx.execute(
            "UPDATE style_versions SET is_active = false WHERE is_active",
            &[],
        )
        .await
        .map_err(query_err("style_deactivate_all"))?;
        tx.execute("UPDATE style_versions SET is_active = true WHERE id = $1", &[&id])
            .await
            .map_err(query_err("style_activate"))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionFailed {
                reason: e.to_string(),
            })
    }

    async fn count_active(&self) -> StorageResult<usize> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one("SELECT count(*) FROM style_versions WHERE is_active", &[])
            .await
            .map_err(query_err("style_count_active"))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as usize)
    }
}
