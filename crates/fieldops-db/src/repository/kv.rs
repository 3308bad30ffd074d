//! # Key-Value Repository
//!
//! SQLite implementation of [`DurableStore`].
//!
//! Every single-key call is one autocommit statement. `write_batch` wraps its
//! writes in one transaction so a crash between the "remove from pending" and
//! "add to dead letters" halves of a move can never be observed.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::store::{DurableStore, KvWrite};

/// Repository over the `kv_store` table.
#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
}

impl KvRepository {
    /// Creates a new KvRepository.
    pub fn new(pool: SqlitePool) -> Self {
        KvRepository { pool }
    }

    /// Number of stored keys, across every prefix.
    pub async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

fn prefix_len(prefix: &str) -> i64 {
    prefix.chars().count() as i64
}

#[async_trait]
impl DurableStore for KvRepository {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_prefix(&self, prefix: &str) -> DbResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT key, value
            FROM kv_store
            WHERE substr(key, 1, ?1) = ?2
            ORDER BY key ASC
            "#,
        )
        .bind(prefix_len(prefix))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_prefix(&self, prefix: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM kv_store WHERE substr(key, 1, ?1) = ?2")
            .bind(prefix_len(prefix))
            .bind(prefix)
            .execute(&self.pool)
            .await?;

        debug!(prefix = %prefix, deleted = result.rows_affected(), "Deleted by prefix");
        Ok(result.rows_affected())
    }

    async fn write_batch(&self, writes: Vec<KvWrite>) -> DbResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let count = writes.len();

        for write in writes {
            let outcome = match &write {
                KvWrite::Put { key, value } => {
                    sqlx::query(
                        r#"
                        INSERT INTO kv_store (key, value, updated_at)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(key) DO UPDATE SET
                            value = excluded.value,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(key)
                    .bind(value)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                }
                KvWrite::Delete { key } => {
                    sqlx::query("DELETE FROM kv_store WHERE key = ?1")
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                }
            };

            if let Err(e) = outcome {
                warn!(key = %write.key(), error = %e, "Batch write failed, rolling back");
                // Dropping the transaction rolls it back.
                return Err(DbError::TransactionFailed(e.to_string()));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(writes = count, "Batch committed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> KvRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.kv()
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let kv = setup().await;

        assert_eq!(kv.get("pending/a").await.unwrap(), None);

        kv.put("pending/a", "{\"v\":1}").await.unwrap();
        kv.put("pending/a", "{\"v\":2}").await.unwrap();

        assert_eq!(kv.get("pending/a").await.unwrap().as_deref(), Some("{\"v\":2}"));
        assert_eq!(kv.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let kv = setup().await;
        kv.put("dead/x", "1").await.unwrap();

        assert!(kv.delete("dead/x").await.unwrap());
        assert!(!kv.delete("dead/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_prefix_is_scoped_and_sorted() {
        let kv = setup().await;
        kv.put("pending/b", "2").await.unwrap();
        kv.put("pending/a", "1").await.unwrap();
        kv.put("dead/a", "x").await.unwrap();
        kv.put("pendingX", "no").await.unwrap();

        let rows = kv.list_prefix("pending/").await.unwrap();

        assert_eq!(
            rows,
            vec![
                ("pending/a".to_string(), "1".to_string()),
                ("pending/b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_prefix_leaves_other_prefixes() {
        let kv = setup().await;
        kv.put("pending/a", "1").await.unwrap();
        kv.put("pending/b", "2").await.unwrap();
        kv.put("meta/last_sync_attempt", "\"t\"").await.unwrap();

        assert_eq!(kv.delete_prefix("pending/").await.unwrap(), 2);
        assert!(kv.list_prefix("pending/").await.unwrap().is_empty());
        assert!(kv.get("meta/last_sync_attempt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_batch_applies_all() {
        let kv = setup().await;
        kv.put("pending/op-1", "queued").await.unwrap();

        kv.write_batch(vec![
            KvWrite::delete("pending/op-1"),
            KvWrite::put("dead/op-1", "dead"),
        ])
        .await
        .unwrap();

        assert_eq!(kv.get("pending/op-1").await.unwrap(), None);
        assert_eq!(kv.get("dead/op-1").await.unwrap().as_deref(), Some("dead"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let kv = setup().await;
        kv.write_batch(Vec::new()).await.unwrap();
        assert_eq!(kv.count().await.unwrap(), 0);
    }
}
