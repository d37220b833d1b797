use tracing::{error, warn};

use super::SentenceEncoder;
use crate::metadata::FieldEmbeddings;
use crate::profile::{ListField, UserProfile};

/// Fields that get their own vector next to the whole-profile embedding.
pub const EMBEDDING_FIELDS: [ListField; 6] = [
    ListField::CurrentInterests,
    ListField::FavoriteFoods,
    ListField::LikedSports,
    ListField::Pets,
    ListField::SelfDevelopment,
    ListField::Hobbies,
];

/// Encode each requested field in one batched call.
///
/// Empty fields get a zero vector. A failed batch, a short batch, or a vector of the wrong
/// dimension degrades the affected fields to zero vectors; this never fails.
pub async fn encode_fields(
    encoder: &dyn SentenceEncoder,
    profile: &UserProfile,
    fields: &[ListField],
) -> FieldEmbeddings {
    let dimension = encoder.dimension();
    let mut result = FieldEmbeddings::new();
    let mut texts = Vec::new();
    let mut pending = Vec::new();

    for field in fields {
        let values: Vec<&str> = profile
            .list(*field)
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            result.insert(field.key().to_string(), vec![0.0; dimension]);
        } else {
            texts.push(values.join(", "));
            pending.push(*field);
        }
    }

    if pending.is_empty() {
        return result;
    }

    let vectors = match encoder.encode_batch(&texts).await {
        Ok(vectors) => vectors,
        Err(err) => {
            error!(
                user_id = %profile.user_id,
                fields = pending.len(),
                error = %err,
                "field embedding batch failed; using zero vectors"
            );
            Vec::new()
        }
    };

    let mut vectors = vectors.into_iter();
    for field in pending {
        let vector = match vectors.next() {
            Some(v) if v.len() == dimension => v,
            Some(v) => {
                warn!(
                    user_id = %profile.user_id,
                    field = field.key(),
                    expected = dimension,
                    actual = v.len(),
                    "field embedding has wrong dimension; using zero vector"
                );
                vec![0.0; dimension]
            }
            None => vec![0.0; dimension],
        };
        result.insert(field.key().to_string(), vector);
    }

    result
}
