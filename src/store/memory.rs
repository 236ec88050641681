// In-Memory Store Client - Project Maester
// "A vault of parchment, kept in the head"

use super::StoreClient;
use crate::error::{MaesterError, MaesterResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory implementation of the store client capability set
///
/// Backs the three stores when no external database is wired in, and doubles
/// as the failure-injectable fake for resilience testing. Records are JSON
/// objects keyed by a sequential `id`; an explicit `id` in a created record
/// is honored and the sequence skips past it.
pub struct MemoryStoreClient {
    name: String,
    collections: DashMap<String, DashMap<i64, Value>>,
    next_ids: DashMap<String, i64>,
    available: AtomicBool,
    injected_failures: Mutex<VecDeque<MaesterError>>,
}

impl MemoryStoreClient {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            collections: DashMap::new(),
            next_ids: DashMap::new(),
            available: AtomicBool::new(true),
            injected_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Queue an error to be returned by the next record operation
    pub async fn inject_failure(&self, error: MaesterError) {
        self.injected_failures.lock().await.push_back(error);
    }

    /// Number of records currently held in a collection
    pub fn record_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> MaesterResult<()> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(MaesterError::connection_error(format!(
                "connection refused: {} store is unreachable",
                self.name
            )))
        }
    }

    async fn take_injected_failure(&self) -> Option<MaesterError> {
        self.injected_failures.lock().await.pop_front()
    }

    /// Availability plus any injected failure, checked before every record op
    async fn check_operational(&self) -> MaesterResult<()> {
        self.check_available()?;
        if let Some(error) = self.take_injected_failure().await {
            return Err(error);
        }
        Ok(())
    }

    fn allocate_id(&self, collection: &str, explicit: Option<i64>) -> i64 {
        let mut counter = self.next_ids.entry(collection.to_string()).or_insert(1);
        match explicit {
            Some(id) => {
                *counter = (*counter).max(id + 1);
                id
            }
            None => {
                let id = *counter;
                *counter += 1;
                id
            }
        }
    }

    fn matches_filter(record: &Value, filter: &Value) -> bool {
        match filter.as_object() {
            Some(fields) => fields
                .iter()
                .all(|(key, expected)| record.get(key) == Some(expected)),
            None => true,
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStoreClient {
    async fn connect(&self) -> MaesterResult<()> {
        self.check_available()?;
        debug!("⚬ Memory store {} connected", self.name);
        Ok(())
    }

    async fn disconnect(&self) -> MaesterResult<()> {
        debug!("⚬ Memory store {} disconnected", self.name);
        Ok(())
    }

    async fn ping(&self) -> MaesterResult<()> {
        self.check_available()
    }

    async fn create(&self, collection: &str, record: Value) -> MaesterResult<Value> {
        self.check_operational().await?;

        let mut record = match record {
            Value::Object(fields) => fields,
            other => {
                return Err(MaesterError::validation(format!(
                    "record must be a JSON object, got {other}"
                )))
            }
        };

        let explicit_id = record.get("id").and_then(Value::as_i64);
        let id = self.allocate_id(collection, explicit_id);

        let entries = self
            .collections
            .entry(collection.to_string())
            .or_default();
        if entries.contains_key(&id) {
            return Err(MaesterError::constraint_violation(format!(
                "duplicate id {id} in {collection}"
            )));
        }

        record.insert("id".to_string(), Value::from(id));
        let stored = Value::Object(record);
        entries.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, collection: &str, id: i64) -> MaesterResult<Option<Value>> {
        self.check_operational().await?;

        Ok(self
            .collections
            .get(collection)
            .and_then(|entries| entries.get(&id).map(|record| record.clone())))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Option<&Value>,
    ) -> MaesterResult<Vec<Value>> {
        self.check_operational().await?;

        let mut records: Vec<Value> = match self.collections.get(collection) {
            Some(entries) => entries
                .iter()
                .filter(|entry| match filter {
                    Some(filter) => Self::matches_filter(entry.value(), filter),
                    None => true,
                })
                .map(|entry| entry.value().clone())
                .collect(),
            None => Vec::new(),
        };

        records.sort_by_key(|record| record.get("id").and_then(Value::as_i64).unwrap_or(0));
        Ok(records)
    }

    async fn update(&self, collection: &str, id: i64, changes: Value) -> MaesterResult<Value> {
        self.check_operational().await?;

        let changes = match changes {
            Value::Object(fields) => fields,
            other => {
                return Err(MaesterError::validation(format!(
                    "update changes must be a JSON object, got {other}"
                )))
            }
        };

        let entries = self
            .collections
            .get(collection)
            .ok_or_else(|| MaesterError::not_found(format!("{collection} {id}")))?;
        let mut record = entries
            .get_mut(&id)
            .ok_or_else(|| MaesterError::not_found(format!("{collection} {id}")))?;

        if let Some(fields) = record.as_object_mut() {
            for (key, value) in changes {
                if key == "id" {
                    continue;
                }
                fields.insert(key, value);
            }
        }

        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, id: i64) -> MaesterResult<Value> {
        self.check_operational().await?;

        let entries = self
            .collections
            .get(collection)
            .ok_or_else(|| MaesterError::not_found(format!("{collection} {id}")))?;
        let (_, removed) = entries
            .remove(&id)
            .ok_or_else(|| MaesterError::not_found(format!("{collection} {id}")))?;
        Ok(removed)
    }
}
