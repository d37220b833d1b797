use crate::metadata::FieldEmbeddings;

use super::EMBEDDING_FIELDS;

const PROFILE_SHARE: f32 = 0.6;
const FIELD_SHARE: f32 = 0.4;

fn dot_and_norms(a: &[f32], b: &[f32]) -> (f64, f64, f64) {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot, norm_a, norm_b)
}

/// Raw cosine in [-1, 1]. Zero vectors and length mismatches score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = dot_and_norms(a, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cosine of `query` against every row, in row order.
pub fn cosine_similarities(query: &[f32], rows: &[Vec<f32>]) -> Vec<f64> {
    rows.iter().map(|row| cosine_similarity(query, row)).collect()
}

/// L2-normalized copy; zero vectors are returned unchanged.
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// Element-wise mean of the embedding fields present with the right dimension.
fn mean_field_vector(fields: &FieldEmbeddings, dimension: usize) -> Vec<f32> {
    let vectors: Vec<&Vec<f32>> = EMBEDDING_FIELDS
        .iter()
        .filter_map(|field| fields.get(field.key()))
        .filter(|v| v.len() == dimension)
        .collect();

    let mut mean = vec![0.0f32; dimension];
    if vectors.is_empty() {
        return mean;
    }
    for vector in &vectors {
        for (acc, value) in mean.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
    }
    let count = vectors.len() as f32;
    for value in &mut mean {
        *value /= count;
    }
    mean
}

/// `0.6 * normalize(profile) + 0.4 * normalize(mean(field vectors))`
pub fn blend_with_fields(profile: &[f32], fields: &FieldEmbeddings) -> Vec<f32> {
    let profile = normalize(profile);
    let fields = normalize(&mean_field_vector(fields, profile.len()));
    profile
        .iter()
        .zip(fields.iter())
        .map(|(p, f)| PROFILE_SHARE * p + FIELD_SHARE * f)
        .collect()
}
