/// 友達カテゴリ: 文章の意味的な近さを重視
pub const FRIEND_WEIGHTS: Weights = Weights {
    embedding: 0.7,
    rule: 0.3,
};

/// カップルカテゴリ: ルール（MBTI・年代・価値観）の比重を上げる
pub const COUPLE_WEIGHTS: Weights = Weights {
    embedding: 0.6,
    rule: 0.4,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub embedding: f64,
    pub rule: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.embedding + self.rule
    }

    pub fn blend(&self, cosine: f64, rule: f64) -> f64 {
        self.embedding * cosine + self.rule * rule
    }
}
