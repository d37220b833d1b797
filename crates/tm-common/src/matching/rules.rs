//! ルールベースの相性スコア
//!
//! すべて [0, 1] に収まり、小数点以下6桁に丸める。

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

use super::RuleVariant;
use crate::profile::{AgeGroup, Mbti, UserProfile};
use crate::round6;

/// E/I, N/S, F/T, J/P の各軸の重み
const MBTI_AXIS_WEIGHTS: [f64; 4] = [0.5, 1.0, 1.0, 0.5];
/// 軸一致度と補完関係の配分
const MBTI_SIMILARITY_SHARE: f64 = 0.7;

lazy_static! {
    /// 補完関係（有向）: key の相手として相性が良い2タイプ
    static ref MBTI_COMPLEMENTS: HashMap<Mbti, [Mbti; 2]> = {
        use Mbti::*;
        let mut m = HashMap::new();
        m.insert(Intj, [Enfp, Entp]);
        m.insert(Intp, [Entj, Enfj]);
        m.insert(Infj, [Enfp, Entp]);
        m.insert(Infp, [Enfj, Esfj]);
        m.insert(Istj, [Esfp, Estp]);
        m.insert(Istp, [Esfj, Enfj]);
        m.insert(Isfj, [Estp, Esfp]);
        m.insert(Isfp, [Enfj, Esfj]);
        m.insert(Entj, [Infp, Intp]);
        m.insert(Entp, [Infj, Intj]);
        m.insert(Enfj, [Infp, Isfp]);
        m.insert(Enfp, [Infj, Intj]);
        m.insert(Estj, [Isfp, Istp]);
        m.insert(Estp, [Isfj, Istj]);
        m.insert(Esfj, [Isfp, Infp]);
        m.insert(Esfp, [Isfj, Istj]);
        m
    };
}

/// MBTI 相性スコア
///
/// - 両方不明: 0.5（情報なし同士を孤立させない）
/// - 片方のみ不明: 0.6
/// - それ以外: 0.7 * 軸一致度 + 0.3 * 補完関係（a → b の向きで判定）
pub fn mbti_compatibility(a: Option<Mbti>, b: Option<Mbti>) -> f64 {
    let (a, b) = match (a, b) {
        (None, None) => return 0.5,
        (Some(a), Some(b)) => (a, b),
        _ => return 0.6,
    };

    let (la, lb) = (a.letters(), b.letters());
    let total: f64 = MBTI_AXIS_WEIGHTS.iter().sum();
    let matched: f64 = (0..4)
        .filter(|&i| la[i] == lb[i])
        .map(|i| MBTI_AXIS_WEIGHTS[i])
        .sum();
    let similarity = matched / total;

    let complement = if MBTI_COMPLEMENTS
        .get(&a)
        .is_some_and(|partners| partners.contains(&b))
    {
        1.0
    } else {
        0.0
    };

    round6(MBTI_SIMILARITY_SHARE * similarity + (1.0 - MBTI_SIMILARITY_SHARE) * complement)
}

/// 年代の近さ: 同じ 1.0 / 隣接 0.5 / それ以上離れる・不明 0.0
pub fn age_group_proximity(a: Option<AgeGroup>, b: Option<AgeGroup>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    match a.rank().abs_diff(b.rank()) {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    }
}

/// タグ集合の Jaccard 係数（どちらかが空なら 0.0）
pub fn tag_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    round6(intersection as f64 / union as f64)
}

/// プロフィール間のルールベース類似度
///
/// Full:
/// - 宗教・喫煙・飲酒の一致率: 30%
/// - MBTI 相性: 20%
/// - 年代の近さ: 20%
/// - 希望する人柄 × 相手の性格（双方向の平均）: 30%
///
/// MbtiAge: MBTI 50% + 年代 50%
pub fn rule_similarity(a: &UserProfile, b: &UserProfile, variant: RuleVariant) -> f64 {
    let mbti = mbti_compatibility(a.mbti, b.mbti);
    let age = age_group_proximity(a.age_group, b.age_group);

    let score = match variant {
        RuleVariant::Full => {
            // 未設定同士も一致として数える
            let matches = [
                a.religion == b.religion,
                a.smoking == b.smoking,
                a.drinking == b.drinking,
            ]
            .iter()
            .filter(|m| **m)
            .count();
            let base = matches as f64 / 3.0;

            let preference = (tag_overlap(&a.preferred_people, &b.personality)
                + tag_overlap(&b.preferred_people, &a.personality))
                / 2.0;

            base * 0.3 + mbti * 0.2 + age * 0.2 + preference * 0.3
        }
        RuleVariant::MbtiAge => mbti * 0.5 + age * 0.5,
    };

    round6(score)
}
