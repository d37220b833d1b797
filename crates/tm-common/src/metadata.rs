//! Flat string metadata codecs.
//!
//! Store records carry `String -> String` metadata. Anything nested (similarity maps,
//! per-field embeddings, list attributes) is JSON-encoded here and nowhere else.

use std::collections::BTreeMap;
use std::str::FromStr;

use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::warn;

use crate::profile::{ListField, UserProfile};

pub type Metadata = BTreeMap<String, String>;
/// other_user_id -> score (6 decimals)
pub type SimilarityMap = BTreeMap<String, f64>;
/// field key -> embedding vector
pub type FieldEmbeddings = BTreeMap<String, Vec<f32>>;

pub const USER_ID_KEY: &str = "userId";
pub const SIMILARITIES_KEY: &str = "similarities";
pub const FIELD_EMBEDDINGS_KEY: &str = "field_embeddings";

const MBTI_KEY: &str = "MBTI";
const AGE_GROUP_KEY: &str = "ageGroup";
const GENDER_KEY: &str = "gender";
const RELIGION_KEY: &str = "religion";
const SMOKING_KEY: &str = "smoking";
const DRINKING_KEY: &str = "drinking";
const EMAIL_DOMAIN_KEY: &str = "emailDomain";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub fn encode_similarity_map(user_id: &str, map: &SimilarityMap) -> Result<Metadata, CodecError> {
    let encoded = serde_json::to_string(map).map_err(|source| CodecError::Encode {
        key: SIMILARITIES_KEY,
        source,
    })?;
    let mut meta = Metadata::new();
    meta.insert(USER_ID_KEY.into(), user_id.to_string());
    meta.insert(SIMILARITIES_KEY.into(), encoded);
    Ok(meta)
}

/// A record without a `similarities` key decodes to an empty map.
pub fn decode_similarity_map(meta: &Metadata) -> Result<SimilarityMap, CodecError> {
    match meta.get(SIMILARITIES_KEY) {
        Some(raw) => serde_json::from_str(raw).map_err(|source| CodecError::Decode {
            key: SIMILARITIES_KEY,
            source,
        }),
        None => Ok(SimilarityMap::new()),
    }
}

pub fn encode_field_embeddings(fields: &FieldEmbeddings) -> Result<String, CodecError> {
    serde_json::to_string(fields).map_err(|source| CodecError::Encode {
        key: FIELD_EMBEDDINGS_KEY,
        source,
    })
}

pub fn decode_field_embeddings(meta: &Metadata) -> Result<FieldEmbeddings, CodecError> {
    match meta.get(FIELD_EMBEDDINGS_KEY) {
        Some(raw) => serde_json::from_str(raw).map_err(|source| CodecError::Decode {
            key: FIELD_EMBEDDINGS_KEY,
            source,
        }),
        None => Ok(FieldEmbeddings::new()),
    }
}

pub fn profile_to_metadata(
    profile: &UserProfile,
    field_embeddings: &FieldEmbeddings,
) -> Result<Metadata, CodecError> {
    let mut meta = Metadata::new();
    meta.insert(USER_ID_KEY.into(), profile.user_id.clone());

    let categorical = [
        (MBTI_KEY, profile.mbti.map(|v| v.as_ref().to_string())),
        (AGE_GROUP_KEY, profile.age_group.map(|v| v.as_ref().to_string())),
        (GENDER_KEY, profile.gender.map(|v| v.as_ref().to_string())),
        (RELIGION_KEY, profile.religion.map(|v| v.as_ref().to_string())),
        (SMOKING_KEY, profile.smoking.map(|v| v.as_ref().to_string())),
        (DRINKING_KEY, profile.drinking.map(|v| v.as_ref().to_string())),
        (EMAIL_DOMAIN_KEY, profile.email_domain.clone()),
    ];
    for (key, value) in categorical {
        if let Some(value) = value {
            meta.insert(key.into(), value);
        }
    }

    for field in ListField::iter() {
        let encoded =
            serde_json::to_string(profile.list(field)).map_err(|source| CodecError::Encode {
                key: field.key(),
                source,
            })?;
        meta.insert(field.key().into(), encoded);
    }

    meta.insert(
        FIELD_EMBEDDINGS_KEY.into(),
        encode_field_embeddings(field_embeddings)?,
    );
    Ok(meta)
}

fn parse_enum<T: FromStr>(meta: &Metadata, key: &str) -> Option<T> {
    meta.get(key)
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| T::from_str(raw).ok())
}

/// Lists are JSON arrays; older rows stored them as `", "`-joined strings.
fn parse_list(meta: &Metadata, key: &str) -> Vec<String> {
    let Some(raw) = meta.get(key) else {
        return Vec::new();
    };
    if let Ok(values) = serde_json::from_str::<Vec<String>>(raw) {
        return values;
    }
    raw.split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rebuild a profile from stored metadata. Unknown categorical codes decode to `None`
/// so that the rules treat them as absent.
pub fn profile_from_metadata(user_id: &str, meta: &Metadata) -> UserProfile {
    let mut profile = UserProfile {
        user_id: user_id.to_string(),
        mbti: parse_enum(meta, MBTI_KEY),
        age_group: parse_enum(meta, AGE_GROUP_KEY),
        gender: parse_enum(meta, GENDER_KEY),
        religion: parse_enum(meta, RELIGION_KEY),
        smoking: parse_enum(meta, SMOKING_KEY),
        drinking: parse_enum(meta, DRINKING_KEY),
        email_domain: meta
            .get(EMAIL_DOMAIN_KEY)
            .filter(|v| !v.is_empty())
            .cloned(),
        ..Default::default()
    };
    for field in ListField::iter() {
        *profile.list_mut(field) = parse_list(meta, field.key());
    }
    if let Some(raw) = meta.get(MBTI_KEY) {
        if profile.mbti.is_none() && !raw.trim().is_empty() {
            warn!(user_id, mbti = %raw, "unrecognized MBTI code in stored profile");
        }
    }
    profile
}
