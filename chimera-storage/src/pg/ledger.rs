use super::{decode_err, is_unique_violation, query_err, PgStore};
use crate::traits::{RequestLedger, StorageResult};
use chimera_core::{
    AcquireOutcome, ArtifactKind, CompletionStatus, Fingerprint, RequestRecord, RequestStatus,
    StorageError,
};
use std::time::Duration;
use tokio_postgres::Row;
use uuid::Uuid;

const REQUEST_COLUMNS: &str = "id, fingerprint, kind, status, created_at, started_at, updated_at";

/// Insert attempts before giving up when the in-flight row keeps vanishing
/// between the failed insert and the follow-up read.
const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

fn row_to_record(row: &Row) -> StorageResult<RequestRecord> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(RequestRecord {
        id: row.get("id"),
        fingerprint: Fingerprint::from_stored(row.get::<_, String>("fingerprint")),
        kind: ArtifactKind::from_db_str(&kind).map_err(|e| decode_err("generation_request", e))?,
        status: RequestStatus::from_db_str(&status)
            .map_err(|e| decode_err("generation_request", e))?,
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait::async_trait]
impl RequestLedger for PgStore {
    async fn try_acquire(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> StorageResult<AcquireOutcome> {
        let conn = self.get_conn().await?;

        for attempt in 1..=MAX_ACQUIRE_ATTEMPTS {
            let inserted = conn
                .query_one(
                    &*format!(
                        "INSERT INTO generation_requests \
                         (id, fingerprint, kind, status, created_at, updated_at) \
                         VALUES ($1, $2, $3, 'pending', now(), now()) \
                         RETURNING {}",
                        REQUEST_COLUMNS
                    ),
                    &[&Uuid::now_v7(), &fingerprint.as_str(), &kind.as_db_str()],
                )
                .await;

            match inserted {
                Ok(row) => return Ok(AcquireOutcome::Acquired(row_to_record(&row)?)),
                Err(e) if is_unique_violation(&e) => {
                    let existing = conn
                        .query_opt(
                            &*format!(
                                "SELECT {} FROM generation_requests \
                                 WHERE fingerprint = $1 AND kind = $2 \
                                   AND status IN ('pending', 'processing') \
                                 LIMIT 1",
                                REQUEST_COLUMNS
                            ),
                            &[&fingerprint.as_str(), &kind.as_db_str()],
                        )
                        .await
                        .map_err(query_err("ledger_acquire"))?;
                    match existing {
                        Some(row) => {
                            return Ok(AcquireOutcome::AlreadyInFlight(row_to_record(&row)?))
                        }
                        None => {
                            tracing::debug!(
                                fingerprint = %fingerprint.short(),
                                attempt,
                                "In-flight request finished during acquire, retrying"
                            );
                        }
                    }
                }
                Err(e) => return Err(StorageError::query("ledger_acquire", e)),
            }
        }

        Err(StorageError::query(
            "ledger_acquire",
            format!("slot contended for {} attempts", MAX_ACQUIRE_ATTEMPTS),
        ))
    }

    async fn mark_processing(&self, record: &RequestRecord) -> StorageResult<RequestRecord> {
        let conn = self.get_conn().await?;
        let updated = conn
            .query_opt(
                &*format!(
                    "UPDATE generation_requests \
                     SET status = 'processing', started_at = now(), updated_at = now() \
                     WHERE id = $1 AND status = 'pending' \
                     RETURNING {}",
                    REQUEST_COLUMNS
                ),
                &[&record.id],
            )
            .await
            .map_err(query_err("ledger_mark_processing"))?;

        if let Some(row) = updated {
            return row_to_record(&row);
        }
        self.status(record.id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "generation_request".to_string(),
                id: record.id.to_string(),
            })
    }

    async fn complete(
        &self,
        record: &RequestRecord,
        status: CompletionStatus,
    ) -> StorageResult<bool> {
        let status = RequestStatus::from(status);
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE generation_requests SET status = $2, updated_at = now() \
                 WHERE id = $1 AND status IN ('pending', 'processing')",
                &[&record.id, &status.as_db_str()],
            )
            .await
            .map_err(query_err("ledger_complete"))?;
        Ok(updated > 0)
    }

    async fn status(&self, id: Uuid) -> StorageResult<Option<RequestRecord>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &*format!("SELECT {} FROM generation_requests WHERE id = $1", REQUEST_COLUMNS),
                &[&id],
            )
            .await
            .map_err(query_err("ledger_status"))?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn reclaim_stale(&self, max_age: Duration) -> StorageResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE generation_requests SET status = 'failed', updated_at = now() \
             WHERE status IN ('pending', 'processing') \
               AND COALESCE(started_at, created_at) < now() - make_interval(secs => $1)",
            &[&max_age.as_secs_f64()],
        )
        .await
        .map_err(query_err("ledger_reclaim_stale"))
    }
}
