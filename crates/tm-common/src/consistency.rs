//! Keeps per-category similarity maps consistent in both directions.
//!
//! Best effort and last-write-wins: no locking, every write is an independent upsert.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::matching::Category;
use crate::metadata::{SimilarityMap, decode_similarity_map, encode_similarity_map};
use crate::snapshot::{ProfileSnapshot, StoredProfile};
use crate::store::{Collection, Include, Record, StoreError, VectorStore};

/// When a persist may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistRule {
    /// Stored map already holds every entry of the new map with the same value.
    Covers,
    /// Stored map is exactly the new map.
    Equals,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub forward_written: bool,
    pub reverse_written: usize,
    pub enriched: usize,
    pub final_written: bool,
}

pub struct ConsistencyManager {
    store: Arc<dyn VectorStore>,
}

impl ConsistencyManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    async fn stored_map(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<Option<SimilarityMap>, StoreError> {
        let ids = [user_id.to_string()];
        let existing = self
            .store
            .get(collection, Some(&ids), Include::METADATAS)
            .await?;
        let Some(record) = existing.records.into_iter().next() else {
            return Ok(None);
        };
        match decode_similarity_map(&record.metadata) {
            Ok(map) => Ok(Some(map)),
            Err(err) => {
                warn!(user_id, error = %err, "stored similarity map unreadable; overwriting");
                Ok(None)
            }
        }
    }

    async fn persist(
        &self,
        user_id: &str,
        embedding: Option<&[f32]>,
        map: &SimilarityMap,
        category: Category,
        rule: PersistRule,
    ) -> Result<bool, StoreError> {
        let collection = Collection::Similarity(category);
        if let Some(stored) = self.stored_map(collection, user_id).await? {
            let unchanged = match rule {
                PersistRule::Covers => map.iter().all(|(id, score)| stored.get(id) == Some(score)),
                PersistRule::Equals => &stored == map,
            };
            if unchanged {
                return Ok(false);
            }
        }

        let record = Record::new(
            user_id,
            embedding.map(<[f32]>::to_vec),
            encode_similarity_map(user_id, map)?,
        );
        self.store.upsert(collection, vec![record]).await?;
        Ok(true)
    }

    /// Forward persist: skipped when the stored map already covers `map`.
    pub async fn persist_forward(
        &self,
        user_id: &str,
        embedding: Option<&[f32]>,
        map: &SimilarityMap,
        category: Category,
    ) -> Result<bool, StoreError> {
        self.persist(user_id, embedding, map, category, PersistRule::Covers)
            .await
    }

    /// Final persist: afterwards the stored map is exactly `map`.
    pub async fn persist_exact(
        &self,
        user_id: &str,
        embedding: Option<&[f32]>,
        map: &SimilarityMap,
        category: Category,
    ) -> Result<bool, StoreError> {
        self.persist(user_id, embedding, map, category, PersistRule::Equals)
            .await
    }

    /// Write `user_id -> score` into every scored candidate's own map.
    ///
    /// Candidates without a similarity record start from an empty map and take their
    /// embedding from the profile collection. Returns the number of records written.
    #[instrument(skip(self, fresh), fields(candidates = fresh.len()))]
    pub async fn propagate_reverse(
        &self,
        user_id: &str,
        fresh: &SimilarityMap,
        category: Category,
    ) -> Result<usize, StoreError> {
        if fresh.is_empty() {
            return Ok(0);
        }
        let collection = Collection::Similarity(category);
        let other_ids: Vec<String> = fresh.keys().cloned().collect();

        let mut existing: HashMap<String, (SimilarityMap, Option<Vec<f32>>)> = self
            .store
            .get(collection, Some(&other_ids), Include::ALL)
            .await?
            .records
            .into_iter()
            .map(|record| {
                let map = decode_similarity_map(&record.metadata).unwrap_or_else(|err| {
                    warn!(other_id = %record.id, error = %err, "reverse map unreadable; starting empty");
                    SimilarityMap::new()
                });
                (record.id, (map, record.embedding))
            })
            .collect();

        let missing: Vec<String> = other_ids
            .iter()
            .filter(|id| !existing.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let profiles = self
                .store
                .get(Collection::UserProfiles, Some(&missing), Include::EMBEDDINGS)
                .await?;
            for record in profiles.records {
                existing.insert(record.id, (SimilarityMap::new(), record.embedding));
            }
        }

        let mut batch = Vec::new();
        for (other_id, score) in fresh {
            let Some((reverse_map, embedding)) = existing.get_mut(other_id) else {
                debug!(other_id, "candidate vanished before reverse update");
                continue;
            };
            if reverse_map.get(user_id) == Some(score) {
                continue;
            }
            reverse_map.insert(user_id.to_string(), *score);
            batch.push(Record::new(
                other_id.clone(),
                embedding.clone(),
                encode_similarity_map(other_id, reverse_map)?,
            ));
        }

        let written = batch.len();
        if written > 0 {
            self.store.upsert(collection, batch).await?;
        }
        Ok(written)
    }

    /// Merge `other -> s` for every other user whose map records `user_id -> s`
    /// while `fresh` has no entry for them. Fresh values always win.
    #[instrument(skip(self, fresh, snapshot))]
    pub async fn enrich(
        &self,
        user_id: &str,
        fresh: &SimilarityMap,
        snapshot: &ProfileSnapshot,
        category: Category,
    ) -> Result<SimilarityMap, StoreError> {
        let mut enriched = fresh.clone();
        let other_ids: Vec<String> = snapshot
            .iter()
            .map(StoredProfile::user_id)
            .filter(|id| *id != user_id)
            .map(str::to_string)
            .collect();
        if other_ids.is_empty() {
            return Ok(enriched);
        }

        let others = self
            .store
            .get(Collection::Similarity(category), Some(&other_ids), Include::METADATAS)
            .await?;
        for record in others.records {
            if enriched.contains_key(&record.id) {
                continue;
            }
            let Ok(other_map) = decode_similarity_map(&record.metadata) else {
                continue;
            };
            if let Some(score) = other_map.get(user_id) {
                enriched.insert(record.id, *score);
            }
        }
        Ok(enriched)
    }

    /// Forward persist, reverse propagation, enrichment and final persist for one
    /// (user, category). Returns the final map.
    pub async fn apply(
        &self,
        user: &StoredProfile,
        fresh: SimilarityMap,
        snapshot: &ProfileSnapshot,
        category: Category,
    ) -> Result<(SimilarityMap, ApplyStats), StoreError> {
        let user_id = user.user_id();
        let embedding = user.embedding.as_deref();

        let forward_written = self
            .persist_forward(user_id, embedding, &fresh, category)
            .await?;
        let reverse_written = self.propagate_reverse(user_id, &fresh, category).await?;
        let enriched = self.enrich(user_id, &fresh, snapshot, category).await?;
        let final_written = self
            .persist_exact(user_id, embedding, &enriched, category)
            .await?;

        let stats = ApplyStats {
            forward_written,
            reverse_written,
            enriched: enriched.len() - fresh.len(),
            final_written,
        };
        debug!(user_id, category = category.as_ref(), ?stats, "similarity map applied");
        Ok((enriched, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserProfile;
    use crate::store::MemoryVectorStore;

    fn map(entries: &[(&str, f64)]) -> SimilarityMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn stored(id: &str) -> StoredProfile {
        StoredProfile {
            profile: UserProfile {
                user_id: id.into(),
                ..Default::default()
            },
            embedding: Some(vec![1.0, 0.0]),
            field_embeddings: Default::default(),
        }
    }

    async fn read_map(store: &MemoryVectorStore, category: Category, id: &str) -> SimilarityMap {
        let ids = [id.to_string()];
        let got = store
            .get(Collection::Similarity(category), Some(&ids), Include::METADATAS)
            .await
            .unwrap();
        decode_similarity_map(&got.records[0].metadata).unwrap()
    }

    async fn seed_profiles(store: &MemoryVectorStore, ids: &[&str]) {
        let records = ids
            .iter()
            .map(|id| Record::new(*id, Some(vec![0.0, 1.0]), Default::default()))
            .collect();
        store.add(Collection::UserProfiles, records).await.unwrap();
    }

    #[tokio::test]
    async fn forward_persist_skips_covered_maps() {
        let store = Arc::new(MemoryVectorStore::new());
        let manager = ConsistencyManager::new(store.clone());
        let category = Category::Friend;

        let full = map(&[("b", 0.5), ("c", 0.25)]);
        assert!(manager.persist_exact("a", None, &full, category).await.unwrap());
        let writes = store.write_count();

        let subset = map(&[("b", 0.5)]);
        assert!(!manager.persist_forward("a", None, &subset, category).await.unwrap());
        assert_eq!(store.write_count(), writes);

        // exact persist of the same subset must shrink the stored map
        assert!(manager.persist_exact("a", None, &subset, category).await.unwrap());
        assert_eq!(read_map(&store, category, "a").await, subset);
    }

    #[tokio::test]
    async fn reverse_propagation_creates_and_updates_entries() {
        let store = Arc::new(MemoryVectorStore::new());
        let manager = ConsistencyManager::new(store.clone());
        let category = Category::Couple;
        seed_profiles(&store, &["b", "c"]).await;
        manager
            .persist_exact("b", None, &map(&[("x", 0.9), ("a", 0.1)]), category)
            .await
            .unwrap();

        let fresh = map(&[("b", 0.4), ("c", 0.3), ("ghost", 0.2)]);
        let written = manager.propagate_reverse("a", &fresh, category).await.unwrap();
        assert_eq!(written, 2);

        assert_eq!(read_map(&store, category, "b").await, map(&[("a", 0.4), ("x", 0.9)]));
        assert_eq!(read_map(&store, category, "c").await, map(&[("a", 0.3)]));

        // c had no similarity record; its vector comes from the profile collection
        let ids = ["c".to_string()];
        let c = store
            .get(Collection::Similarity(category), Some(&ids), Include::EMBEDDINGS)
            .await
            .unwrap();
        assert_eq!(c.records[0].embedding, Some(vec![0.0, 1.0]));

        let again = manager.propagate_reverse("a", &fresh, category).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn enrichment_fills_gaps_but_keeps_fresh_values() {
        let store = Arc::new(MemoryVectorStore::new());
        let manager = ConsistencyManager::new(store.clone());
        let category = Category::Friend;
        manager
            .persist_exact("b", None, &map(&[("a", 0.11)]), category)
            .await
            .unwrap();
        manager
            .persist_exact("c", None, &map(&[("a", 0.22)]), category)
            .await
            .unwrap();
        manager
            .persist_exact("d", None, &map(&[("z", 0.33)]), category)
            .await
            .unwrap();

        let snapshot = ProfileSnapshot::new(vec![stored("a"), stored("b"), stored("c"), stored("d")]);
        let fresh = map(&[("b", 0.5)]);
        let enriched = manager.enrich("a", &fresh, &snapshot, category).await.unwrap();
        assert_eq!(enriched, map(&[("b", 0.5), ("c", 0.22)]));
    }

    #[tokio::test]
    async fn apply_is_a_no_op_on_rerun() {
        let store = Arc::new(MemoryVectorStore::new());
        let manager = ConsistencyManager::new(store.clone());
        let category = Category::Friend;
        seed_profiles(&store, &["a", "b"]).await;
        let snapshot = ProfileSnapshot::new(vec![stored("a"), stored("b")]);
        let user = snapshot.get("a").unwrap();

        let (first, stats) = manager
            .apply(user, map(&[("b", 0.7)]), &snapshot, category)
            .await
            .unwrap();
        assert_eq!(first, map(&[("b", 0.7)]));
        assert!(stats.forward_written);
        assert_eq!(stats.reverse_written, 1);

        let writes = store.write_count();
        let (_, stats) = manager
            .apply(user, map(&[("b", 0.7)]), &snapshot, category)
            .await
            .unwrap();
        assert_eq!(stats, ApplyStats::default());
        assert_eq!(store.write_count(), writes);
    }
}
