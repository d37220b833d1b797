use thiserror::Error;

use crate::encoder::EncodingError;
use crate::metadata::CodecError;
use crate::store::StoreError;

/// Profile rejected at the registration boundary, before any encoder or store work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("user_id must not be empty")]
    EmptyUserId,
    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),
    #[error("at least one of {} must contain an item", .0.join(", "))]
    NoListValues(Vec<&'static str>),
}

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("metadata codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("user {0} not found")]
    NotFound(String),
    #[error("user {0} is already registered")]
    Duplicate(String),
}

impl MatchingError {
    /// Stable machine-readable code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            MatchingError::Validation(_) => "VALIDATION_FAILED",
            MatchingError::Encoding(_) => "ENCODING_FAILED",
            MatchingError::Store(_) => "STORE_UNAVAILABLE",
            MatchingError::Codec(_) => "METADATA_CODEC_FAILED",
            MatchingError::NotFound(_) => "SIMILARITY_USER_NOT_FOUND",
            MatchingError::Duplicate(_) => "CONFLICT_DUPLICATE_ID",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_list_fields() {
        let err = ValidationError::MissingRequired(vec!["mbti", "religion"]);
        assert_eq!(err.to_string(), "missing required fields: mbti, religion");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            MatchingError::NotFound("u1".into()).code(),
            "SIMILARITY_USER_NOT_FOUND"
        );
        assert_eq!(
            MatchingError::from(ValidationError::EmptyUserId).code(),
            "VALIDATION_FAILED"
        );
    }
}
