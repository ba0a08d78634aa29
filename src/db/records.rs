//! The record store interface and its two implementations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::debug;

use super::Db;
use crate::error::{Error, Result};
use crate::model::RecordId;
use crate::telemetry::metrics;

/// Insert-and-lookup persistence for plain string values.
pub trait RecordStore: Send + Sync {
    /// Store `value` and return the id it was filed under.
    fn save(&self, value: &str) -> impl Future<Output = Result<RecordId>> + Send;

    /// Fetch the value stored under `id`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if nothing was saved under `id`.
    fn lookup(&self, id: RecordId) -> impl Future<Output = Result<String>> + Send;
}

impl RecordStore for Db {
    async fn save(&self, value: &str) -> Result<RecordId> {
        let id = RecordId::new();
        sqlx::query("INSERT INTO records (id, value, created_at) VALUES ($1, $2, $3)")
            .bind(id.0)
            .bind(value)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        metrics::record_operations().add(1, &[KeyValue::new("operation", "save")]);
        debug!(%id, "record saved");
        Ok(id)
    }

    async fn lookup(&self, id: RecordId) -> Result<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM records WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        metrics::record_operations().add(1, &[KeyValue::new("operation", "lookup")]);
        row.map(|(value,)| value)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

/// Records held in a map for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryRecords {
    records: Mutex<HashMap<RecordId, String>>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecords {
    async fn save(&self, value: &str) -> Result<RecordId> {
        let id = RecordId::new();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, value.to_string());
        metrics::record_operations().add(1, &[KeyValue::new("operation", "save")]);
        Ok(id)
    }

    async fn lookup(&self, id: RecordId) -> Result<String> {
        metrics::record_operations().add(1, &[KeyValue::new("operation", "lookup")]);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_records_save_then_lookup() {
        let store = MemoryRecords::new();
        let id = store.save("chenxi").await.unwrap();
        assert_eq!(store.lookup(id).await.unwrap(), "chenxi");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn memory_records_give_each_save_its_own_id() {
        let store = MemoryRecords::new();
        let a = store.save("same").await.unwrap();
        let b = store.save("same").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn lookup_of_unknown_id_is_not_found() {
        let store = MemoryRecords::new();
        let err = store.lookup(RecordId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
