pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod util;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::matching::Category;
use crate::metadata::{CodecError, Metadata};

pub use memory::MemoryVectorStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url};
pub use postgres::PostgresVectorStore;

pub const HEALTH_CHECK_ATTEMPTS: u32 = 5;
pub const HEALTH_CHECK_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record {id} already exists in {collection}")]
    Duplicate { collection: &'static str, id: String },
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("metadata codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Store partitions: the profile collection plus one similarity collection per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    UserProfiles,
    Similarity(Category),
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::UserProfiles,
        Collection::Similarity(Category::Friend),
        Collection::Similarity(Category::Couple),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::UserProfiles => "user_profiles",
            Collection::Similarity(Category::Friend) => "similarity_friend",
            Collection::Similarity(Category::Couple) => "similarity_couple",
        }
    }
}

/// Which optional parts of a record a `get` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Include {
    pub embeddings: bool,
    pub metadatas: bool,
}

impl Include {
    pub const ALL: Include = Include {
        embeddings: true,
        metadatas: true,
    };
    pub const METADATAS: Include = Include {
        embeddings: false,
        metadatas: true,
    };
    pub const EMBEDDINGS: Include = Include {
        embeddings: true,
        metadatas: false,
    };
    pub const IDS: Include = Include {
        embeddings: false,
        metadatas: false,
    };
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Metadata,
}

impl Record {
    pub fn new(id: impl Into<String>, embedding: Option<Vec<f32>>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata,
        }
    }
}

/// Records found by a `get`. Ids that do not exist are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResult {
    pub records: Vec<Record>,
}

impl GetResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }
}

/// Keyed vector store with flat string metadata, one partition per `Collection`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// `ids = None` returns the whole collection.
    async fn get(
        &self,
        collection: Collection,
        ids: Option<&[String]>,
        include: Include,
    ) -> Result<GetResult, StoreError>;

    /// Insert new records; fails with `Duplicate` when any id already exists.
    async fn add(&self, collection: Collection, records: Vec<Record>) -> Result<(), StoreError>;

    /// Insert or replace. A record without an embedding keeps the stored one.
    async fn upsert(&self, collection: Collection, records: Vec<Record>)
    -> Result<(), StoreError>;

    async fn delete(&self, collection: Collection, ids: &[String]) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Poll `health_check` until it succeeds, sleeping `delay` between attempts.
pub async fn wait_until_healthy(
    store: &dyn VectorStore,
    attempts: u32,
    delay: Duration,
) -> Result<(), StoreError> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match store.health_check().await {
            Ok(()) => {
                info!(store = store.name(), attempt, "vector store is healthy");
                return Ok(());
            }
            Err(err) => {
                warn!(
                    store = store.name(),
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "vector store health check failed"
                );
                last_error = Some(err);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error.unwrap_or_else(|| StoreError::Unavailable("health check never ran".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_follow_category() {
        assert_eq!(Collection::UserProfiles.name(), "user_profiles");
        assert_eq!(
            Collection::Similarity(Category::Couple).name(),
            "similarity_couple"
        );
    }

    #[tokio::test]
    async fn wait_until_healthy_retries_until_success() {
        let store = MemoryVectorStore::new();
        store.fail_next_health_checks(2);
        wait_until_healthy(&store, 5, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(store.health_checks(), 3);
    }

    #[tokio::test]
    async fn wait_until_healthy_gives_up_after_attempts() {
        let store = MemoryVectorStore::new();
        store.set_unavailable(true);
        let err = wait_until_healthy(&store, 3, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.health_checks(), 3);
    }
}
