#![allow(dead_code)]

use std::sync::Arc;

use tm_common::encoder::{
    EMBEDDING_FIELDS, HashSentenceEncoder, encode_fields, profile_to_sentence,
};
use tm_common::matching::MatchingConfig;
use tm_common::metadata::{SimilarityMap, decode_similarity_map, profile_to_metadata};
use tm_common::profile::{DrinkingStatus, Gender, Mbti, Religion, SmokingStatus};
use tm_common::service::MatchingService;
use tm_common::store::{Collection, Include, MemoryVectorStore, Record, VectorStore};
use tm_common::{Category, UserProfile};

pub const DIMENSION: usize = 64;

pub fn profile(id: &str, mbti: Mbti, gender: Option<Gender>, domain: &str) -> UserProfile {
    UserProfile {
        user_id: id.into(),
        mbti: Some(mbti),
        gender,
        religion: Some(Religion::Unaffiliated),
        smoking: Some(SmokingStatus::NonSmoker),
        drinking: Some(DrinkingStatus::Sometimes),
        email_domain: Some(domain.into()),
        current_interests: vec![format!("topic {id}"), "music".into()],
        hobbies: vec!["reading".into()],
        ..Default::default()
    }
}

pub struct Harness {
    pub store: Arc<MemoryVectorStore>,
    pub encoder: Arc<HashSentenceEncoder>,
    pub service: Arc<MatchingService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryVectorStore::new());
        let encoder = Arc::new(HashSentenceEncoder::new(DIMENSION));
        let service = Arc::new(MatchingService::new(
            encoder.clone(),
            store.clone(),
            MatchingConfig::default(),
        ));
        Self {
            store,
            encoder,
            service,
        }
    }

    /// Store a profile with its vectors without scoring it.
    pub async fn seed(&self, profile: &UserProfile) {
        let embedding = self.encoder.embed(&profile_to_sentence(profile));
        let fields = encode_fields(self.encoder.as_ref(), profile, &EMBEDDING_FIELDS).await;
        let metadata = profile_to_metadata(profile, &fields).unwrap();
        self.store
            .add(
                Collection::UserProfiles,
                vec![Record::new(profile.user_id.clone(), Some(embedding), metadata)],
            )
            .await
            .unwrap();
    }

    pub async fn similarity_map(&self, category: Category, id: &str) -> Option<SimilarityMap> {
        let ids = [id.to_string()];
        let result = self
            .store
            .get(Collection::Similarity(category), Some(&ids), Include::METADATAS)
            .await
            .unwrap();
        result
            .records
            .first()
            .map(|record| decode_similarity_map(&record.metadata).unwrap())
    }

    pub async fn put_similarity_map(&self, category: Category, id: &str, map: SimilarityMap) {
        let metadata = tm_common::metadata::encode_similarity_map(id, &map).unwrap();
        self.store
            .upsert(
                Collection::Similarity(category),
                vec![Record::new(id, None, metadata)],
            )
            .await
            .unwrap();
    }
}

pub fn map(entries: &[(&str, f64)]) -> SimilarityMap {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
