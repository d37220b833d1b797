use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{EncodingError, SentenceEncoder};

#[derive(Debug, Serialize)]
struct EncodeRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Remote sentence-embedding service.
///
/// `POST {endpoint}` with `{"texts": [...]}`, answered by `{"embeddings": [[...], ...]}`.
pub struct HttpSentenceEncoder {
    client: reqwest::Client,
    endpoint: String,
    dimension: usize,
}

impl HttpSentenceEncoder {
    pub fn new(
        endpoint: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EncodingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dimension,
        })
    }
}

#[async_trait]
impl SentenceEncoder for HttpSentenceEncoder {
    fn name(&self) -> &'static str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    #[instrument(skip(self, texts), fields(endpoint = %self.endpoint, count = texts.len()))]
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EncodeRequest { texts })
            .send()
            .await?
            .error_for_status()?;
        let body: EncodeResponse = response.json().await?;

        if body.embeddings.len() != texts.len() {
            return Err(EncodingError::CountMismatch {
                expected: texts.len(),
                actual: body.embeddings.len(),
            });
        }
        debug!("encoded batch");
        Ok(body.embeddings)
    }
}
