//! # In-Memory Store
//!
//! A [`DurableStore`] that keeps everything in a `BTreeMap`. Nothing survives
//! the process, but the contract is otherwise identical to the SQLite store,
//! so queue tests can run without a database file.
//!
//! Writes and reads can be made to fail on demand to exercise the
//! "storage unavailable" paths of callers.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{DbError, DbResult};
use crate::store::{DurableStore, KvWrite};

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<BTreeMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every key currently stored.
    pub fn keys(&self) -> Vec<String> {
        match self.inner.entries.lock() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn entries(&self) -> DbResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.inner
            .entries
            .lock()
            .map_err(|_| DbError::Internal("memory store lock poisoned".to_string()))
    }

    fn check_read(&self) -> DbResult<()> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::ConnectionFailed("memory store reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> DbResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::QueryFailed("memory store writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.check_read()?;
        Ok(self.entries()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        self.check_write()?;
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        self.check_write()?;
        Ok(self.entries()?.remove(key).is_some())
    }

    async fn list_prefix(&self, prefix: &str) -> DbResult<Vec<(String, String)>> {
        self.check_read()?;
        let map = self.entries()?;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> DbResult<u64> {
        self.check_write()?;
        let mut map = self.entries()?;
        let before = map.len();
        map.retain(|k, _| !k.starts_with(prefix));
        Ok((before - map.len()) as u64)
    }

    async fn write_batch(&self, writes: Vec<KvWrite>) -> DbResult<()> {
        self.check_write()?;
        // Applied under one lock, so no reader sees a partial batch.
        let mut map = self.entries()?;
        for write in writes {
            match write {
                KvWrite::Put { key, value } => {
                    map.insert(key, value);
                }
                KvWrite::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_listing_sorted() {
        let store = MemoryStore::new();
        store.put("pending/2", "b").await.unwrap();
        store.put("pending/1", "a").await.unwrap();
        store.put("dead/1", "z").await.unwrap();

        let rows = store.list_prefix("pending/").await.unwrap();
        let keys: Vec<_> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["pending/1", "pending/2"]);
    }

    #[tokio::test]
    async fn test_failed_write_changes_nothing() {
        let store = MemoryStore::new();
        store.put("pending/1", "a").await.unwrap();
        store.set_fail_writes(true);

        assert!(store.put("pending/2", "b").await.is_err());
        assert!(store
            .write_batch(vec![KvWrite::delete("pending/1")])
            .await
            .is_err());

        store.set_fail_writes(false);
        assert_eq!(store.keys(), vec!["pending/1".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.put("meta/x", "1").await.unwrap();
        assert_eq!(b.get("meta/x").await.unwrap().as_deref(), Some("1"));
        assert_eq!(b.delete_prefix("meta/").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_reads() {
        let store = MemoryStore::new();
        store.set_fail_reads(true);
        assert!(store.list_prefix("pending/").await.is_err());
    }
}
