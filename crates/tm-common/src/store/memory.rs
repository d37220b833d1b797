use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::{Collection, GetResult, Include, Record, StoreError, VectorStore};
use crate::matching::Category;
use crate::metadata::Metadata;

#[derive(Debug, Clone)]
struct StoredRecord {
    embedding: Option<Vec<f32>>,
    metadata: Metadata,
}

/// In-process store for local runs and tests.
///
/// Counts every record written and supports failure injection so that callers can
/// exercise partial-failure paths without a database.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    profiles: DashMap<String, StoredRecord>,
    friend: DashMap<String, StoredRecord>,
    couple: DashMap<String, StoredRecord>,
    writes: AtomicUsize,
    health_checks: AtomicU32,
    unavailable: AtomicBool,
    failing_health_checks: AtomicU32,
    failing_write_ids: DashSet<String>,
    failing_reads: DashSet<&'static str>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, collection: Collection) -> &DashMap<String, StoredRecord> {
        match collection {
            Collection::UserProfiles => &self.profiles,
            Collection::Similarity(Category::Friend) => &self.friend,
            Collection::Similarity(Category::Couple) => &self.couple,
        }
    }

    /// Records written (added, upserted or deleted) since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn health_checks(&self) -> u32 {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collection(collection).len()
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.collection(collection).is_empty()
    }

    /// Every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_next_health_checks(&self, count: u32) {
        self.failing_health_checks.store(count, Ordering::SeqCst);
    }

    /// Any add/upsert batch containing `id`, in any collection, fails.
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        self.failing_write_ids.insert(id.into());
    }

    pub fn clear_write_failures(&self) {
        self.failing_write_ids.clear();
    }

    /// Every `get` on `collection` fails.
    pub fn fail_reads_of(&self, collection: Collection) {
        self.failing_reads.insert(collection.name());
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn check_writable(&self, collection: Collection, records: &[Record]) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(record) = records
            .iter()
            .find(|r| self.failing_write_ids.contains(&r.id))
        {
            return Err(StoreError::Unavailable(format!(
                "injected write failure for {} in {}",
                record.id,
                collection.name()
            )));
        }
        Ok(())
    }

    fn project(id: &str, stored: &StoredRecord, include: Include) -> Record {
        Record {
            id: id.to_string(),
            embedding: if include.embeddings {
                stored.embedding.clone()
            } else {
                None
            },
            metadata: if include.metadatas {
                stored.metadata.clone()
            } else {
                Metadata::new()
            },
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        collection: Collection,
        ids: Option<&[String]>,
        include: Include,
    ) -> Result<GetResult, StoreError> {
        self.check_available()?;
        if self.failing_reads.contains(collection.name()) {
            return Err(StoreError::Unavailable(format!(
                "injected read failure for {}",
                collection.name()
            )));
        }

        let map = self.collection(collection);
        let records = match ids {
            Some(ids) => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .filter_map(|id| map.get(id).map(|entry| Self::project(id, &entry, include)))
                    .collect()
            }
            None => {
                let mut records: Vec<Record> = map
                    .iter()
                    .map(|entry| Self::project(entry.key(), entry.value(), include))
                    .collect();
                records.sort_by(|a, b| a.id.cmp(&b.id));
                records
            }
        };
        Ok(GetResult { records })
    }

    async fn add(&self, collection: Collection, records: Vec<Record>) -> Result<(), StoreError> {
        self.check_writable(collection, &records)?;
        let map = self.collection(collection);

        let mut batch_ids = HashSet::new();
        for record in &records {
            if map.contains_key(&record.id) || !batch_ids.insert(record.id.as_str()) {
                return Err(StoreError::Duplicate {
                    collection: collection.name(),
                    id: record.id.clone(),
                });
            }
        }

        let count = records.len();
        for record in records {
            map.insert(
                record.id,
                StoredRecord {
                    embedding: record.embedding,
                    metadata: record.metadata,
                },
            );
        }
        self.writes.fetch_add(count, Ordering::SeqCst);
        debug!(collection = collection.name(), count, "memory add");
        Ok(())
    }

    async fn upsert(
        &self,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<(), StoreError> {
        self.check_writable(collection, &records)?;
        let map = self.collection(collection);

        let count = records.len();
        for record in records {
            let embedding = match record.embedding {
                Some(embedding) => Some(embedding),
                None => map.get(&record.id).and_then(|e| e.embedding.clone()),
            };
            map.insert(
                record.id,
                StoredRecord {
                    embedding,
                    metadata: record.metadata,
                },
            );
        }
        self.writes.fetch_add(count, Ordering::SeqCst);
        debug!(collection = collection.name(), count, "memory upsert");
        Ok(())
    }

    async fn delete(&self, collection: Collection, ids: &[String]) -> Result<(), StoreError> {
        self.check_available()?;
        let map = self.collection(collection);
        let removed = ids.iter().filter(|id| map.remove(*id).is_some()).count();
        self.writes.fetch_add(removed, Ordering::SeqCst);
        debug!(collection = collection.name(), removed, "memory delete");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let remaining = self.failing_health_checks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_health_checks
                .store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("memory store warming up".into()));
        }
        Ok(())
    }
}
