use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

use crate::error::ValidationError;

/// 16 types. Parsing is case-insensitive; anything else is treated as "unknown" by the rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Mbti {
    Intj,
    Intp,
    Infj,
    Infp,
    Istj,
    Istp,
    Isfj,
    Isfp,
    Entj,
    Entp,
    Enfj,
    Enfp,
    Estj,
    Estp,
    Esfj,
    Esfp,
}

impl Mbti {
    /// Letters in axis order: E/I, N/S, F/T, J/P.
    pub fn letters(self) -> [u8; 4] {
        let code = self.as_ref().as_bytes();
        [code[0], code[1], code[2], code[3]]
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
    EnumIter,
)]
pub enum AgeGroup {
    #[serde(rename = "AGE_10S")]
    #[strum(serialize = "AGE_10S")]
    Age10s,
    #[serde(rename = "AGE_20S")]
    #[strum(serialize = "AGE_20S")]
    Age20s,
    #[serde(rename = "AGE_30S")]
    #[strum(serialize = "AGE_30S")]
    Age30s,
    #[serde(rename = "AGE_40S")]
    #[strum(serialize = "AGE_40S")]
    Age40s,
    #[serde(rename = "AGE_50S")]
    #[strum(serialize = "AGE_50S")]
    Age50s,
    #[serde(rename = "AGE_60S")]
    #[strum(serialize = "AGE_60S")]
    Age60s,
}

impl AgeGroup {
    pub fn rank(self) -> u8 {
        match self {
            AgeGroup::Age10s => 1,
            AgeGroup::Age20s => 2,
            AgeGroup::Age30s => 3,
            AgeGroup::Age40s => 4,
            AgeGroup::Age50s => 5,
            AgeGroup::Age60s => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Religion {
    #[serde(rename = "NONE")]
    #[strum(serialize = "NONE")]
    Unaffiliated,
    Christian,
    Catholic,
    Buddhist,
    Other,
}

impl Religion {
    pub fn label(self) -> &'static str {
        match self {
            Religion::Unaffiliated => "none",
            Religion::Christian => "Christianity",
            Religion::Catholic => "Catholicism",
            Religion::Buddhist => "Buddhism",
            Religion::Other => "another faith",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SmokingStatus {
    NonSmoker,
    Occasional,
    Smoker,
}

impl SmokingStatus {
    pub fn label(self) -> &'static str {
        match self {
            SmokingStatus::NonSmoker => "non-smoking",
            SmokingStatus::Occasional => "smoking occasionally",
            SmokingStatus::Smoker => "smoking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DrinkingStatus {
    Never,
    Sometimes,
    Often,
}

impl DrinkingStatus {
    pub fn label(self) -> &'static str {
        match self {
            DrinkingStatus::Never => "not drinking",
            DrinkingStatus::Sometimes => "drinking sometimes",
            DrinkingStatus::Often => "drinking often",
        }
    }
}

/// List-valued profile attributes, keyed by their metadata name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum ListField {
    Personality,
    PreferredPeople,
    CurrentInterests,
    FavoriteFoods,
    LikedSports,
    Pets,
    SelfDevelopment,
    Hobbies,
}

impl ListField {
    pub fn key(self) -> &'static str {
        match self {
            ListField::Personality => "personality",
            ListField::PreferredPeople => "preferredPeople",
            ListField::CurrentInterests => "currentInterests",
            ListField::FavoriteFoods => "favoriteFoods",
            ListField::LikedSports => "likedSports",
            ListField::Pets => "pets",
            ListField::SelfDevelopment => "selfDevelopment",
            ListField::Hobbies => "hobbies",
        }
    }
}

/// Fields of which at least one must be non-empty at registration.
pub const MIN_LIST_FIELDS: [ListField; 7] = [
    ListField::Personality,
    ListField::PreferredPeople,
    ListField::CurrentInterests,
    ListField::FavoriteFoods,
    ListField::LikedSports,
    ListField::Pets,
    ListField::SelfDevelopment,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(rename = "MBTI", default)]
    pub mbti: Option<Mbti>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub religion: Option<Religion>,
    #[serde(default)]
    pub smoking: Option<SmokingStatus>,
    #[serde(default)]
    pub drinking: Option<DrinkingStatus>,
    #[serde(default)]
    pub email_domain: Option<String>,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub preferred_people: Vec<String>,
    #[serde(default)]
    pub current_interests: Vec<String>,
    #[serde(default)]
    pub favorite_foods: Vec<String>,
    #[serde(default)]
    pub liked_sports: Vec<String>,
    #[serde(default)]
    pub pets: Vec<String>,
    #[serde(default)]
    pub self_development: Vec<String>,
    #[serde(default)]
    pub hobbies: Vec<String>,
}

impl UserProfile {
    pub fn list(&self, field: ListField) -> &[String] {
        match field {
            ListField::Personality => &self.personality,
            ListField::PreferredPeople => &self.preferred_people,
            ListField::CurrentInterests => &self.current_interests,
            ListField::FavoriteFoods => &self.favorite_foods,
            ListField::LikedSports => &self.liked_sports,
            ListField::Pets => &self.pets,
            ListField::SelfDevelopment => &self.self_development,
            ListField::Hobbies => &self.hobbies,
        }
    }

    pub fn list_mut(&mut self, field: ListField) -> &mut Vec<String> {
        match field {
            ListField::Personality => &mut self.personality,
            ListField::PreferredPeople => &mut self.preferred_people,
            ListField::CurrentInterests => &mut self.current_interests,
            ListField::FavoriteFoods => &mut self.favorite_foods,
            ListField::LikedSports => &mut self.liked_sports,
            ListField::Pets => &mut self.pets,
            ListField::SelfDevelopment => &mut self.self_development,
            ListField::Hobbies => &mut self.hobbies,
        }
    }

    /// Registration-time checks. Stored profiles are never re-validated.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::EmptyUserId);
        }

        let mut missing = Vec::new();
        if self.mbti.is_none() {
            missing.push("MBTI");
        }
        if self.religion.is_none() {
            missing.push("religion");
        }
        if self.smoking.is_none() {
            missing.push("smoking");
        }
        if self.drinking.is_none() {
            missing.push("drinking");
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequired(missing));
        }

        let has_list_value = MIN_LIST_FIELDS
            .iter()
            .any(|field| self.list(*field).iter().any(|v| !v.trim().is_empty()));
        if !has_list_value {
            return Err(ValidationError::NoListValues(
                MIN_LIST_FIELDS.iter().map(|f| f.key()).collect(),
            ));
        }

        Ok(())
    }
}
