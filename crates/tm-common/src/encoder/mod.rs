pub mod config;
pub mod fields;
pub mod hash_encoder;
pub mod http_encoder;
pub mod sentence;
pub mod similarity;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use config::{EncoderConfig, EncoderKind};
pub use fields::{EMBEDDING_FIELDS, encode_fields};
pub use hash_encoder::HashSentenceEncoder;
pub use http_encoder::HttpSentenceEncoder;
pub use sentence::profile_to_sentence;
pub use similarity::{blend_with_fields, cosine_similarities, cosine_similarity, normalize};

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("encoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("encoder backend error: {0}")]
    Backend(String),
    #[error("expected {expected} vectors from encoder, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("expected embedding dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid encoder configuration: {0}")]
    Config(String),
}

/// Text → fixed-dimension vector model.
///
/// Implementations:
/// - `HashSentenceEncoder`: feature hashing, deterministic, no model files
/// - `HttpSentenceEncoder`: remote sentence-embedding service
#[async_trait]
pub trait SentenceEncoder: Send + Sync {
    /// "hash", "http"
    fn name(&self) -> &'static str;

    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError>;

    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EncodingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.swap_remove(0))
    }
}

/// `encode_batch` with the count and every dimension checked.
pub async fn encode_batch_checked(
    encoder: &dyn SentenceEncoder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EncodingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = encoder.encode_batch(texts).await?;
    if vectors.len() != texts.len() {
        return Err(EncodingError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    let expected = encoder.dimension();
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        return Err(EncodingError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}

/// Build the configured encoder. Constructed once per process and shared.
pub fn create_encoder(config: &EncoderConfig) -> Result<Arc<dyn SentenceEncoder>, EncodingError> {
    match config.kind {
        EncoderKind::Hash => Ok(Arc::new(HashSentenceEncoder::new(config.dimension))),
        EncoderKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                EncodingError::Config("TM_ENCODER_ENDPOINT is required for the http encoder".into())
            })?;
            Ok(Arc::new(HttpSentenceEncoder::new(
                endpoint,
                config.dimension,
                config.timeout,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEncoder {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl SentenceEncoder for FixedEncoder {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
            Ok(self.vectors.clone())
        }
    }

    #[tokio::test]
    async fn checked_batch_rejects_wrong_count() {
        let encoder = FixedEncoder {
            vectors: vec![vec![1.0, 0.0]],
        };
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = encode_batch_checked(&encoder, &texts).await.unwrap_err();
        assert!(matches!(
            err,
            EncodingError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn checked_batch_rejects_wrong_dimension() {
        let encoder = FixedEncoder {
            vectors: vec![vec![1.0, 0.0, 0.0]],
        };
        let err = encode_batch_checked(&encoder, &["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EncodingError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn single_encode_uses_batch() {
        let encoder = FixedEncoder {
            vectors: vec![vec![0.0, 1.0]],
        };
        assert_eq!(encoder.encode("text").await.unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn single_encode_reports_actual_count() {
        for (vectors, actual) in [(vec![], 0), (vec![vec![1.0, 0.0], vec![0.0, 1.0]], 2)] {
            let encoder = FixedEncoder { vectors };
            let err = encoder.encode("text").await.unwrap_err();
            assert!(
                matches!(err, EncodingError::CountMismatch { expected: 1, actual: a } if a == actual),
                "{err:?}"
            );
        }
    }

    #[test]
    fn http_encoder_requires_endpoint() {
        let config = EncoderConfig {
            kind: EncoderKind::Http,
            endpoint: None,
            ..EncoderConfig::default()
        };
        assert!(matches!(
            create_encoder(&config),
            Err(EncodingError::Config(_))
        ));
    }
}
