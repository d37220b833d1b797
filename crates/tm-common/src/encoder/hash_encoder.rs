use async_trait::async_trait;
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};

use super::{EncodingError, SentenceEncoder};

/// 固定 seed（決定論的 hash のため）
/// ⚠️ 変更すると保存済みの全 embedding と整合しなくなる → 全件再計算が必要
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// Feature Hashing による決定論的な文章エンコーダ
///
/// - 学習不要・モデルファイル不要（オフライン実行・テスト用）
/// - 単語 unigram + bigram を符号付きハッシュで次元に割り当て
/// - SipHash13 + 固定 seed で Rust バージョン間の安定性を保証
pub struct HashSentenceEncoder {
    dimension: usize,
}

impl HashSentenceEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash(token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let idx = (Self::hash(feature) % self.dimension as u64) as usize;
        // Sign hashing: 偶数 → +weight, 奇数 → -weight
        let sign = if Self::hash(&format!("{feature}_sign")) % 2 == 0 {
            1.0
        } else {
            -1.0
        };
        vector[idx] += sign * weight;
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = Self::tokenize(text);

        for token in &tokens {
            self.add_feature(&mut vector, token, UNIGRAM_WEIGHT);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        // L2正規化（空文字列はゼロベクトルのまま）
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl SentenceEncoder for HashSentenceEncoder {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}
