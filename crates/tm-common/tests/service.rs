mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{DIMENSION, Harness, profile};
use tm_common::encoder::HashSentenceEncoder;
use tm_common::matching::MatchingConfig;
use tm_common::profile::{Gender, Mbti};
use tm_common::service::MatchingService;
use tm_common::store::{
    Collection, GetResult, Include, MemoryVectorStore, Record, StoreError, VectorStore,
};
use tm_common::{Category, MatchingError};

#[tokio::test]
async fn registration_scores_both_categories() {
    let h = Harness::new();
    h.service
        .register_user(profile("a", Mbti::Enfp, Some(Gender::Male), "campus.example"))
        .await
        .unwrap();
    let b = h
        .service
        .register_user(profile("b", Mbti::Infj, Some(Gender::Female), "campus.example"))
        .await
        .unwrap();
    assert_eq!(b.friend_matches, 1);
    assert_eq!(b.couple_matches, 1);

    let a_couple = h.similarity_map(Category::Couple, "a").await.unwrap();
    let b_couple = h.similarity_map(Category::Couple, "b").await.unwrap();
    assert_eq!(a_couple["b"], b_couple["a"]);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let h = Harness::new();
    let first = profile("a", Mbti::Entp, None, "campus.example");
    h.service.register_user(first.clone()).await.unwrap();

    let err = h.service.register_user(first).await.unwrap_err();
    assert!(matches!(err, MatchingError::Duplicate(ref id) if id == "a"));
    assert_eq!(err.code(), "CONFLICT_DUPLICATE_ID");
    assert_eq!(h.store.len(Collection::UserProfiles), 1);
}

#[tokio::test]
async fn failed_scoring_rolls_the_registration_back() {
    let h = Harness::new();
    h.seed(&profile("b", Mbti::Isfj, Some(Gender::Female), "campus.example"))
        .await;
    h.store.fail_writes_for("b");

    let err = h
        .service
        .register_user(profile("a", Mbti::Estp, Some(Gender::Male), "campus.example"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STORE_UNAVAILABLE");

    assert!(h.service.stored_profile("a").await.unwrap().is_none());
    assert!(h.similarity_map(Category::Friend, "a").await.is_none());
    assert!(h.similarity_map(Category::Couple, "a").await.is_none());
    assert_eq!(h.store.len(Collection::UserProfiles), 1);
}

/// Fails map reads that look up other users, so scoring breaks after the reverse
/// propagation has already written their records.
struct FailingNeighbourReads {
    inner: Arc<MemoryVectorStore>,
    own_id: &'static str,
}

#[async_trait]
impl VectorStore for FailingNeighbourReads {
    fn name(&self) -> &'static str {
        "failing-neighbour-reads"
    }

    async fn get(
        &self,
        collection: Collection,
        ids: Option<&[String]>,
        include: Include,
    ) -> Result<GetResult, StoreError> {
        if let (Collection::Similarity(_), Some(ids)) = (collection, ids) {
            if include == Include::METADATAS && !ids.iter().any(|id| id == self.own_id) {
                return Err(StoreError::Unavailable("neighbour read refused".into()));
            }
        }
        self.inner.get(collection, ids, include).await
    }

    async fn add(&self, collection: Collection, records: Vec<Record>) -> Result<(), StoreError> {
        self.inner.add(collection, records).await
    }

    async fn upsert(&self, collection: Collection, records: Vec<Record>) -> Result<(), StoreError> {
        self.inner.upsert(collection, records).await
    }

    async fn delete(&self, collection: Collection, ids: &[String]) -> Result<(), StoreError> {
        self.inner.delete(collection, ids).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}

#[tokio::test]
async fn rollback_removes_maps_created_for_the_new_user() {
    let h = Harness::new();
    h.seed(&profile("b", Mbti::Isfj, Some(Gender::Female), "campus.example"))
        .await;
    let service = MatchingService::new(
        Arc::new(HashSentenceEncoder::new(DIMENSION)),
        Arc::new(FailingNeighbourReads {
            inner: h.store.clone(),
            own_id: "a",
        }),
        MatchingConfig::default(),
    );

    let err = service
        .register_user(profile("a", Mbti::Estp, Some(Gender::Male), "campus.example"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STORE_UNAVAILABLE");

    assert_eq!(h.store.len(Collection::Similarity(Category::Friend)), 0);
    assert_eq!(h.store.len(Collection::Similarity(Category::Couple)), 0);
    assert_eq!(h.store.len(Collection::UserProfiles), 1);
}

#[tokio::test]
async fn deletion_keeps_maps_that_become_empty() {
    let h = Harness::new();
    for (id, gender) in [("a", Gender::Male), ("b", Gender::Female)] {
        h.service
            .register_user(profile(id, Mbti::Infp, Some(gender), "campus.example"))
            .await
            .unwrap();
    }

    let deletion = h.service.delete_user("b").await.unwrap();
    assert_eq!(deletion.maps_rewritten, 2);
    assert_eq!(deletion.maps_removed, 0);
    for category in Category::ALL {
        assert_eq!(h.similarity_map(category, "a").await, Some(Default::default()));
    }
}

#[tokio::test]
async fn deleting_a_user_purges_every_mention() {
    let h = Harness::new();
    for (id, gender) in [
        ("a", Gender::Male),
        ("b", Gender::Female),
        ("c", Gender::Other),
    ] {
        h.service
            .register_user(profile(id, Mbti::Istj, Some(gender), "campus.example"))
            .await
            .unwrap();
    }

    let deletion = h.service.delete_user("b").await.unwrap();
    assert!(deletion.profile_removed);
    assert_eq!(deletion.maps_rewritten, 4);
    assert_eq!(deletion.maps_removed, 0);

    assert!(h.service.stored_profile("b").await.unwrap().is_none());
    for category in Category::ALL {
        assert!(h.similarity_map(category, "b").await.is_none());
        for other in ["a", "c"] {
            let map = h.similarity_map(category, other).await.unwrap();
            assert!(!map.contains_key("b"));
            assert_eq!(map.len(), 1);
        }
    }
}

#[tokio::test]
async fn top_matches_orders_by_descending_score() {
    let h = Harness::new();
    for (id, mbti) in [
        ("a", Mbti::Intp),
        ("b", Mbti::Entj),
        ("c", Mbti::Isfp),
        ("d", Mbti::Enfj),
    ] {
        h.service
            .register_user(profile(id, mbti, None, "campus.example"))
            .await
            .unwrap();
    }

    let top = h.service.top_matches("a", Category::Friend, 10).await.unwrap();
    let stored = h.similarity_map(Category::Friend, "a").await.unwrap();
    assert_eq!(top.len(), 3);
    for pair in top.windows(2) {
        assert!(stored[&pair[0]] >= stored[&pair[1]]);
    }

    let first = h.service.top_matches("a", Category::Friend, 1).await.unwrap();
    assert_eq!(first, top[..1].to_vec());
}

#[tokio::test]
async fn unknown_users_are_not_found() {
    let h = Harness::new();
    let err = h
        .service
        .update_similarity_for_user("ghost", Category::Friend, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::NotFound(ref id) if id == "ghost"));
    assert_eq!(err.code(), "SIMILARITY_USER_NOT_FOUND");
}
