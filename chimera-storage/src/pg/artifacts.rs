use super::{decode_err, query_err, PgStore};
use crate::traits::{CacheStore, StorageResult};
use chimera_core::{ArtifactKind, CachedArtifact, Fingerprint, StorageError};
use tokio_postgres::Row;

const ARTIFACT_COLUMNS: &str =
    "id, fingerprint, kind, content, metadata, created_at, expires_at";

fn row_to_artifact(row: &Row) -> StorageResult<CachedArtifact> {
    let kind: String = row.get("kind");
    let content: serde_json::Value = row.get("content");
    let metadata: serde_json::Value = row.get("metadata");
    Ok(CachedArtifact {
        id: row.get("id"),
        fingerprint: Fingerprint::from_stored(row.get::<_, String>("fingerprint")),
        kind: ArtifactKind::from_db_str(&kind).map_err(|e| decode_err("generated_artifact", e))?,
        content: serde_json::from_value(content).map_err(|e| decode_err("generated_artifact", e))?,
        metadata: serde_json::from_value(metadata)
            .map_err(|e| decode_err("generated_artifact", e))?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

#[async_trait::async_trait]
impl CacheStore for PgStore {
    async fn get(&self, fingerprint: &Fingerprint) -> StorageResult<Option<CachedArtifact>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &*format!(
                    "SELECT {} FROM generated_artifacts WHERE fingerprint = $1",
                    ARTIFACT_COLUMNS
                ),
                &[&fingerprint.as_str()],
            )
            .await
            .map_err(query_err("artifact_get"))?;
        row.as_ref().map(row_to_artifact).transpose()
    }

    async fn put(&self, artifact: &CachedArtifact) -> StorageResult<CachedArtifact> {
        let content = serde_json::to_value(&artifact.content)
            .map_err(|e| decode_err("generated_artifact", e))?;
        let metadata = serde_json::to_value(&artifact.metadata)
            .map_err(|e| decode_err("generated_artifact", e))?;

        let conn = self.get_conn().await?;
        // An unexpired row for the same fingerprint is kept; only expired
        // rows are overwritten.
        let inserted = conn
            .query_opt(
                &*format!(
                    "INSERT INTO generated_artifacts ({cols}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     ON CONFLICT (fingerprint) DO UPDATE SET \
                         id = EXCLUDED.id, kind = EXCLUDED.kind, content = EXCLUDED.content, \
                         metadata = EXCLUDED.metadata, created_at = EXCLUDED.created_at, \
                         expires_at = EXCLUDED.expires_at \
                     WHERE generated_artifacts.expires_at <= EXCLUDED.created_at \
                     RETURNING {cols}",
                    cols = ARTIFACT_COLUMNS
                ),
                &[
                    &artifact.id,
                    &artifact.fingerprint.as_str(),
                    &artifact.kind.as_db_str(),
                    &content,
                    &metadata,
                    &artifact.created_at,
                    &artifact.expires_at,
                ],
            )
            .await
            .map_err(query_err("artifact_put"))?;

        match inserted {
            Some(row) => row_to_artifact(&row),
            None => self
                .get(&artifact.fingerprint)
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    entity: "generated_artifact".to_string(),
                    id: artifact.fingerprint.to_string(),
                }),
        }
    }
}
