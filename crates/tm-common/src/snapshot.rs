use std::collections::HashMap;

use tracing::{info, instrument, warn};

use crate::metadata::{FieldEmbeddings, decode_field_embeddings, profile_from_metadata};
use crate::profile::UserProfile;
use crate::store::{Collection, Include, Record, StoreError, VectorStore};

/// A stored profile with the vectors persisted next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub profile: UserProfile,
    pub embedding: Option<Vec<f32>>,
    pub field_embeddings: FieldEmbeddings,
}

impl StoredProfile {
    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    pub fn from_record(record: Record) -> Self {
        let field_embeddings = decode_field_embeddings(&record.metadata).unwrap_or_else(|err| {
            warn!(user_id = %record.id, error = %err, "ignoring unreadable field embeddings");
            FieldEmbeddings::new()
        });
        Self {
            profile: profile_from_metadata(&record.id, &record.metadata),
            embedding: record.embedding,
            field_embeddings,
        }
    }
}

/// Immutable view of the whole profile collection, shared by every task of a run.
#[derive(Debug, Clone, Default)]
pub struct ProfileSnapshot {
    profiles: Vec<StoredProfile>,
    index: HashMap<String, usize>,
}

impl ProfileSnapshot {
    pub fn new(profiles: Vec<StoredProfile>) -> Self {
        let index = profiles
            .iter()
            .enumerate()
            .map(|(i, p)| (p.user_id().to_string(), i))
            .collect();
        Self { profiles, index }
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(records.into_iter().map(StoredProfile::from_record).collect())
    }

    pub fn get(&self, user_id: &str) -> Option<&StoredProfile> {
        self.index.get(user_id).map(|&i| &self.profiles[i])
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.index.contains_key(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredProfile> {
        self.profiles.iter()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|p| p.user_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// One batched read of every profile with embeddings and metadata.
#[instrument(skip(store), fields(store = store.name()))]
pub async fn fetch_snapshot(store: &dyn VectorStore) -> Result<ProfileSnapshot, StoreError> {
    let result = store
        .get(Collection::UserProfiles, None, Include::ALL)
        .await?;
    let snapshot = ProfileSnapshot::from_records(result.records);
    info!(users = snapshot.len(), "loaded profile snapshot");
    Ok(snapshot)
}
