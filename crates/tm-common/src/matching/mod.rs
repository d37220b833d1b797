pub mod cohort;
pub mod engine;
pub mod rules;
pub mod weights;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

pub use cohort::select_cohort;
pub use engine::SimilarityEngine;
pub use rules::{age_group_proximity, mbti_compatibility, rule_similarity, tag_overlap};
pub use weights::{COUPLE_WEIGHTS, FRIEND_WEIGHTS, Weights};

/// Similarity partition. Each category lives in its own store collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Friend,
    Couple,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Friend, Category::Couple];

    pub fn weights(self) -> Weights {
        match self {
            Category::Friend => FRIEND_WEIGHTS,
            Category::Couple => COUPLE_WEIGHTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RuleVariant {
    /// religion/smoking/drinking + MBTI + age + preference-personality overlap
    #[default]
    Full,
    /// MBTI and age group only
    MbtiAge,
}

/// Which vector represents a profile on the embedding side of the blend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EmbeddingBlend {
    #[default]
    Profile,
    /// 0.6 * normalized profile vector + 0.4 * normalized mean of the field vectors
    ProfileWithFields,
}

#[derive(Debug, Clone, Default)]
pub struct MatchingConfig {
    pub rule_variant: RuleVariant,
    pub embedding_blend: EmbeddingBlend,
}

impl MatchingConfig {
    /// `TM_RULE_VARIANT` (full | mbti_age) and `TM_EMBEDDING_BLEND`
    /// (profile | profile_with_fields). Unknown values fall back to the defaults.
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr + Default>(key: &str) -> T {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.trim().to_ascii_lowercase().parse().ok())
                .unwrap_or_default()
        }

        Self {
            rule_variant: parse("TM_RULE_VARIANT"),
            embedding_blend: parse("TM_EMBEDDING_BLEND"),
        }
    }
}
