//! User-facing operations over one encoder and one store.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use tracing::{error, info, instrument, warn};

use crate::consistency::ConsistencyManager;
use crate::encoder::{
    EMBEDDING_FIELDS, SentenceEncoder, encode_batch_checked, encode_fields, profile_to_sentence,
};
use crate::error::MatchingError;
use crate::matching::{Category, MatchingConfig, SimilarityEngine};
use crate::metadata::{decode_similarity_map, encode_similarity_map, profile_to_metadata};
use crate::profile::UserProfile;
use crate::snapshot::{ProfileSnapshot, StoredProfile, fetch_snapshot};
use crate::store::{Collection, Include, Record, StoreError, VectorStore};

/// Maps rewritten per upsert when a deleted user is purged from other users' maps.
pub const PURGE_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub user_id: String,
    pub friend_matches: usize,
    pub couple_matches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deletion {
    pub profile_removed: bool,
    /// Other users' maps that no longer mention the deleted user.
    pub maps_rewritten: usize,
    /// Records dropped because removing the user left their map empty.
    pub maps_removed: usize,
}

/// What happens to another user's record when the purged user was its only entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmptiedMaps {
    Keep,
    Remove,
}

pub struct MatchingService {
    encoder: Arc<dyn SentenceEncoder>,
    store: Arc<dyn VectorStore>,
    engine: SimilarityEngine,
    consistency: ConsistencyManager,
    store_rechecked: AtomicBool,
}

impl MatchingService {
    pub fn new(
        encoder: Arc<dyn SentenceEncoder>,
        store: Arc<dyn VectorStore>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            engine: SimilarityEngine::new(encoder.clone(), config),
            consistency: ConsistencyManager::new(store.clone()),
            encoder,
            store,
            store_rechecked: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn encoder(&self) -> &Arc<dyn SentenceEncoder> {
        &self.encoder
    }

    /// Re-run the store health check once, on the first store failure seen by this service.
    async fn observe_store<T>(&self, result: Result<T, StoreError>) -> Result<T, MatchingError> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !self.store_rechecked.swap(true, AtomicOrdering::SeqCst) {
            match self.store.health_check().await {
                Ok(()) => warn!(store = self.store.name(), error = %err, "store operation failed but store reports healthy"),
                Err(health) => error!(store = self.store.name(), error = %err, health = %health, "store unhealthy after failure"),
            }
        }
        Err(err.into())
    }

    pub async fn fetch_snapshot(&self) -> Result<ProfileSnapshot, MatchingError> {
        self.observe_store(fetch_snapshot(self.store.as_ref()).await)
            .await
    }

    /// Recompute, reconcile and persist one user's map in one category.
    ///
    /// Fetches a snapshot when none is given. Returns the size of the final map.
    #[instrument(skip(self, snapshot), fields(category = category.as_ref()))]
    pub async fn update_similarity_for_user(
        &self,
        user_id: &str,
        category: Category,
        snapshot: Option<&ProfileSnapshot>,
    ) -> Result<usize, MatchingError> {
        let fetched;
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                fetched = self.fetch_snapshot().await?;
                &fetched
            }
        };
        let user = snapshot
            .get(user_id)
            .ok_or_else(|| MatchingError::NotFound(user_id.to_string()))?;

        let fresh = self
            .engine
            .compute_similarities(user, snapshot, category)
            .await?;
        let (final_map, _) = self
            .observe_store(
                self.consistency
                    .apply(user, fresh, snapshot, category)
                    .await,
            )
            .await?;
        Ok(final_map.len())
    }

    /// Validate, embed and store a new profile, then score it in both categories.
    ///
    /// 類似度計算に失敗した場合はプロフィールと類似度をロールバックする。
    #[instrument(skip(self, profile), fields(user_id = %profile.user_id))]
    pub async fn register_user(&self, profile: UserProfile) -> Result<Registration, MatchingError> {
        profile.validate()?;
        let user_id = profile.user_id.clone();

        let ids = [user_id.clone()];
        let existing = self
            .observe_store(
                self.store
                    .get(Collection::UserProfiles, Some(&ids), Include::IDS)
                    .await,
            )
            .await?;
        if existing.contains(&user_id) {
            return Err(MatchingError::Duplicate(user_id));
        }

        let sentence = profile_to_sentence(&profile);
        let embedding = encode_batch_checked(self.encoder.as_ref(), &[sentence])
            .await?
            .pop()
            .unwrap_or_default();
        let field_embeddings =
            encode_fields(self.encoder.as_ref(), &profile, &EMBEDDING_FIELDS).await;
        let metadata = profile_to_metadata(&profile, &field_embeddings)?;

        let record = Record::new(user_id.clone(), Some(embedding), metadata);
        match self.store.add(Collection::UserProfiles, vec![record]).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. }) => return Err(MatchingError::Duplicate(user_id)),
            Err(err) => return self.observe_store(Err(err)).await,
        }

        match self.score_new_user(&user_id).await {
            Ok((friend_matches, couple_matches)) => {
                info!(friend_matches, couple_matches, "user registered");
                Ok(Registration {
                    user_id,
                    friend_matches,
                    couple_matches,
                })
            }
            Err(err) => {
                warn!(error = %err, code = err.code(), "scoring failed; rolling back registration");
                // a map left empty by the purge held only the new user
                if let Err(rollback) = self.purge_user(&user_id, EmptiedMaps::Remove).await {
                    error!(error = %rollback, "registration rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn score_new_user(&self, user_id: &str) -> Result<(usize, usize), MatchingError> {
        let snapshot = self.fetch_snapshot().await?;
        tokio::try_join!(
            self.update_similarity_for_user(user_id, Category::Friend, Some(&snapshot)),
            self.update_similarity_for_user(user_id, Category::Couple, Some(&snapshot)),
        )
    }

    /// Remove the profile, the user's own maps, and every mention of the user in other maps.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<Deletion, MatchingError> {
        self.purge_user(user_id, EmptiedMaps::Keep).await
    }

    async fn purge_user(&self, user_id: &str, emptied: EmptiedMaps) -> Result<Deletion, MatchingError> {
        let ids = [user_id.to_string()];
        let mut summary = Deletion::default();

        for category in Category::ALL {
            let collection = Collection::Similarity(category);
            self.observe_store(self.store.delete(collection, &ids).await)
                .await?;

            let all = self
                .observe_store(self.store.get(collection, None, Include::METADATAS).await)
                .await?;
            let mut rewrites = Vec::new();
            let mut removals = Vec::new();
            for record in all.records {
                let Ok(mut map) = decode_similarity_map(&record.metadata) else {
                    continue;
                };
                if map.remove(user_id).is_none() {
                    continue;
                }
                if map.is_empty() && emptied == EmptiedMaps::Remove {
                    removals.push(record.id);
                    continue;
                }
                rewrites.push(Record::new(
                    record.id.clone(),
                    None,
                    encode_similarity_map(&record.id, &map)?,
                ));
            }

            summary.maps_rewritten += rewrites.len();
            let mut rewrites = rewrites.into_iter().peekable();
            while rewrites.peek().is_some() {
                let batch: Vec<Record> = rewrites.by_ref().take(PURGE_BATCH_SIZE).collect();
                self.observe_store(self.store.upsert(collection, batch).await)
                    .await?;
            }

            summary.maps_removed += removals.len();
            for batch in removals.chunks(PURGE_BATCH_SIZE) {
                self.observe_store(self.store.delete(collection, batch).await)
                    .await?;
            }
        }

        let existing = self
            .observe_store(
                self.store
                    .get(Collection::UserProfiles, Some(&ids), Include::IDS)
                    .await,
            )
            .await?;
        if existing.contains(user_id) {
            self.observe_store(self.store.delete(Collection::UserProfiles, &ids).await)
                .await?;
            summary.profile_removed = true;
        }

        info!(
            profile_removed = summary.profile_removed,
            maps_rewritten = summary.maps_rewritten,
            maps_removed = summary.maps_removed,
            "user purged"
        );
        Ok(summary)
    }

    /// Stored map for the user, best score first; ties ordered by user id.
    #[instrument(skip(self), fields(category = category.as_ref()))]
    pub async fn top_matches(
        &self,
        user_id: &str,
        category: Category,
        limit: usize,
    ) -> Result<Vec<String>, MatchingError> {
        let ids = [user_id.to_string()];
        let stored = self
            .observe_store(
                self.store
                    .get(Collection::Similarity(category), Some(&ids), Include::METADATAS)
                    .await,
            )
            .await?;

        let Some(record) = stored.records.into_iter().next() else {
            let profile = self
                .observe_store(
                    self.store
                        .get(Collection::UserProfiles, Some(&ids), Include::IDS)
                        .await,
                )
                .await?;
            if profile.contains(user_id) {
                return Ok(Vec::new());
            }
            return Err(MatchingError::NotFound(user_id.to_string()));
        };

        let mut ranked: Vec<(String, f64)> = decode_similarity_map(&record.metadata)?
            .into_iter()
            .collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a_id.cmp(b_id))
        });
        Ok(ranked.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    /// Snapshot entry for one user, if stored.
    pub async fn stored_profile(&self, user_id: &str) -> Result<Option<StoredProfile>, MatchingError> {
        let ids = [user_id.to_string()];
        let result = self
            .observe_store(
                self.store
                    .get(Collection::UserProfiles, Some(&ids), Include::ALL)
                    .await,
            )
            .await?;
        Ok(result.records.into_iter().next().map(StoredProfile::from_record))
    }
}
