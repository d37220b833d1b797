use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{Category, EmbeddingBlend, MatchingConfig, rules::rule_similarity, select_cohort};
use crate::encoder::{
    EncodingError, SentenceEncoder, blend_with_fields, cosine_similarities, encode_batch_checked,
    profile_to_sentence,
};
use crate::metadata::SimilarityMap;
use crate::round6;
use crate::snapshot::{ProfileSnapshot, StoredProfile};

/// Blends embedding cosine with rule similarity over the eligible cohort.
pub struct SimilarityEngine {
    encoder: Arc<dyn SentenceEncoder>,
    config: MatchingConfig,
}

impl SimilarityEngine {
    pub fn new(encoder: Arc<dyn SentenceEncoder>, config: MatchingConfig) -> Self {
        Self { encoder, config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Stored vectors are reused; profiles whose vector is missing or has the wrong
    /// dimension are re-encoded together in one batch.
    async fn resolve_embeddings(
        &self,
        profiles: &[&StoredProfile],
    ) -> Result<Vec<Vec<f32>>, EncodingError> {
        let dimension = self.encoder.dimension();
        let stale: Vec<usize> = profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.embedding.as_ref().is_none_or(|v| v.len() != dimension))
            .map(|(i, _)| i)
            .collect();

        let fresh = if stale.is_empty() {
            Vec::new()
        } else {
            warn!(
                count = stale.len(),
                dimension, "re-encoding profiles with missing or mismatched embeddings"
            );
            let texts: Vec<String> = stale
                .iter()
                .map(|&i| profile_to_sentence(&profiles[i].profile))
                .collect();
            encode_batch_checked(self.encoder.as_ref(), &texts).await?
        };

        let mut fresh = fresh.into_iter();

        let mut vectors = Vec::with_capacity(profiles.len());
        let mut stale = stale.into_iter().peekable();
        for (i, profile) in profiles.iter().enumerate() {
            let vector = if stale.peek() == Some(&i) {
                stale.next();
                fresh.next().unwrap_or_else(|| vec![0.0; dimension])
            } else {
                profile.embedding.clone().unwrap_or_default()
            };
            vectors.push(match self.config.embedding_blend {
                EmbeddingBlend::Profile => vector,
                EmbeddingBlend::ProfileWithFields => {
                    blend_with_fields(&vector, &profile.field_embeddings)
                }
            });
        }
        Ok(vectors)
    }

    /// Score every eligible candidate for `user` in `category`.
    ///
    /// `score = w_embedding * cosine + w_rule * rule`, rounded to 6 decimals and not clamped.
    #[instrument(
        skip(self, user, snapshot),
        fields(user_id = %user.user_id(), category = category.as_ref())
    )]
    pub async fn compute_similarities(
        &self,
        user: &StoredProfile,
        snapshot: &ProfileSnapshot,
        category: Category,
    ) -> Result<SimilarityMap, EncodingError> {
        let cohort = select_cohort(&user.profile, snapshot, category);
        if cohort.is_empty() {
            debug!("empty cohort");
            return Ok(SimilarityMap::new());
        }

        let mut profiles = Vec::with_capacity(cohort.len() + 1);
        profiles.push(user);
        profiles.extend(cohort.iter().copied());
        let mut vectors = self.resolve_embeddings(&profiles).await?;
        let candidates = vectors.split_off(1);
        let query = vectors.pop().unwrap_or_default();

        let cosines = cosine_similarities(&query, &candidates);
        let weights = category.weights();

        let scores: SimilarityMap = cohort
            .iter()
            .zip(cosines)
            .map(|(candidate, cosine)| {
                let rule =
                    rule_similarity(&user.profile, &candidate.profile, self.config.rule_variant);
                (
                    candidate.user_id().to_string(),
                    round6(weights.blend(cosine, rule)),
                )
            })
            .collect();

        debug!(candidates = scores.len(), "computed similarities");
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EMBEDDING_FIELDS, EncodingError, HashSentenceEncoder};
    use crate::matching::RuleVariant;
    use crate::metadata::FieldEmbeddings;
    use crate::profile::{Gender, Mbti, UserProfile};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every batch and answers with unit vectors along the first axis.
    struct RecordingEncoder {
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl SentenceEncoder for RecordingEncoder {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
            self.batches.lock().unwrap().push(texts.to_vec());
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn stored(id: &str, gender: Option<Gender>, embedding: Option<Vec<f32>>) -> StoredProfile {
        StoredProfile {
            profile: UserProfile {
                user_id: id.into(),
                email_domain: Some("corp".into()),
                gender,
                mbti: Some(Mbti::Intj),
                hobbies: vec![format!("hobby of {id}")],
                ..Default::default()
            },
            embedding,
            field_embeddings: Default::default(),
        }
    }

    fn engine(encoder: Arc<dyn SentenceEncoder>) -> SimilarityEngine {
        SimilarityEngine::new(encoder, MatchingConfig::default())
    }

    #[tokio::test]
    async fn empty_cohort_returns_empty_map() {
        let snapshot = ProfileSnapshot::new(vec![stored("a", None, Some(vec![1.0, 0.0]))]);
        let engine = engine(Arc::new(HashSentenceEncoder::new(2)));
        let user = snapshot.get("a").unwrap();
        let map = engine
            .compute_similarities(user, &snapshot, Category::Friend)
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn blends_cosine_and_rules_without_clamping() {
        let snapshot = ProfileSnapshot::new(vec![
            stored("a", None, Some(vec![1.0, 0.0])),
            stored("b", None, Some(vec![-1.0, 0.0])),
        ]);
        let engine = engine(Arc::new(HashSentenceEncoder::new(2)));
        let user = snapshot.get("a").unwrap();
        let map = engine
            .compute_similarities(user, &snapshot, Category::Friend)
            .await
            .unwrap();

        // cosine -1.0; rules: base 1.0, mbti 0.7, age 0.0, preference 0.0 -> 0.44
        let expected = round6(0.7 * -1.0 + 0.3 * 0.44);
        assert_eq!(map["b"], expected);
        assert!(map["b"] < 0.0);
        assert!(!map.contains_key("a"));
    }

    #[tokio::test]
    async fn only_stale_embeddings_are_reencoded_in_one_batch() {
        let snapshot = ProfileSnapshot::new(vec![
            stored("a", None, Some(vec![1.0, 0.0])),
            stored("b", None, None),
            stored("c", None, Some(vec![1.0, 0.0, 0.0])),
            stored("d", None, Some(vec![0.0, 1.0])),
        ]);
        let recorder = Arc::new(RecordingEncoder {
            batches: Mutex::new(Vec::new()),
        });
        let engine = engine(recorder.clone());
        let user = snapshot.get("a").unwrap();
        let map = engine
            .compute_similarities(user, &snapshot, Category::Friend)
            .await
            .unwrap();

        let batches = recorder.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(batches[0][0].contains("hobby of b"));
        assert!(batches[0][1].contains("hobby of c"));

        // re-encoded b and c point the same way as a; d is orthogonal
        assert!(map["b"] > map["d"]);
        assert_eq!(map["b"], map["c"]);
    }

    #[tokio::test]
    async fn couple_scores_exclude_same_gender() {
        let snapshot = ProfileSnapshot::new(vec![
            stored("a", Some(Gender::Female), Some(vec![1.0, 0.0])),
            stored("b", Some(Gender::Female), Some(vec![1.0, 0.0])),
            stored("c", Some(Gender::Male), Some(vec![1.0, 0.0])),
        ]);
        let engine = engine(Arc::new(HashSentenceEncoder::new(2)));
        let user = snapshot.get("a").unwrap();

        let couple = engine
            .compute_similarities(user, &snapshot, Category::Couple)
            .await
            .unwrap();
        assert_eq!(couple.keys().collect::<Vec<_>>(), vec!["c"]);

        let friend = engine
            .compute_similarities(user, &snapshot, Category::Friend)
            .await
            .unwrap();
        assert_eq!(friend.len(), 2);
    }

    #[tokio::test]
    async fn reduced_rule_variant_changes_rule_side() {
        let snapshot = ProfileSnapshot::new(vec![
            stored("a", None, Some(vec![0.0, 1.0])),
            stored("b", None, Some(vec![1.0, 0.0])),
        ]);
        let engine = SimilarityEngine::new(
            Arc::new(HashSentenceEncoder::new(2)),
            MatchingConfig {
                rule_variant: RuleVariant::MbtiAge,
                ..MatchingConfig::default()
            },
        );
        let user = snapshot.get("a").unwrap();
        let map = engine
            .compute_similarities(user, &snapshot, Category::Couple)
            .await
            .unwrap();
        // cosine 0.0; mbti 0.7 * 0.5 + age 0.0 -> rule 0.35; couple rule weight 0.4
        assert_eq!(map["b"], 0.14);
    }

    fn with_fields(mut profile: StoredProfile, vector: [f32; 3]) -> StoredProfile {
        profile.field_embeddings = EMBEDDING_FIELDS
            .iter()
            .map(|field| (field.key().to_string(), vector.to_vec()))
            .collect::<FieldEmbeddings>();
        profile
    }

    #[tokio::test]
    async fn field_blend_can_reorder_candidates() {
        let snapshot = ProfileSnapshot::new(vec![
            with_fields(stored("a", None, Some(vec![1.0, 0.0, 0.0])), [0.0, 0.0, 1.0]),
            with_fields(stored("b", None, Some(vec![1.0, 0.0, 0.0])), [0.0, 1.0, 0.0]),
            with_fields(stored("c", None, Some(vec![0.8, 0.6, 0.0])), [0.0, 0.0, 1.0]),
        ]);
        let user = snapshot.get("a").unwrap();

        let profile_only = engine(Arc::new(HashSentenceEncoder::new(3)))
            .compute_similarities(user, &snapshot, Category::Friend)
            .await
            .unwrap();
        assert!(profile_only["b"] > profile_only["c"]);

        let blended = SimilarityEngine::new(
            Arc::new(HashSentenceEncoder::new(3)),
            MatchingConfig {
                embedding_blend: EmbeddingBlend::ProfileWithFields,
                ..MatchingConfig::default()
            },
        )
        .compute_similarities(user, &snapshot, Category::Friend)
        .await
        .unwrap();
        // blended vectors: a (0.6, 0, 0.4), b (0.6, 0.4, 0), c (0.48, 0.36, 0.4)
        assert!(blended["c"] > blended["b"]);
        assert!(blended["b"] < profile_only["b"]);
    }
}
