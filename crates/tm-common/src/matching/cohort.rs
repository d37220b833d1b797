use super::Category;
use crate::profile::UserProfile;
use crate::snapshot::{ProfileSnapshot, StoredProfile};

/// Candidates eligible for `user` in `category`.
///
/// Same email domain only, never the user. Couple additionally drops candidates of the
/// user's own gender, but only when the user's gender is known.
pub fn select_cohort<'a>(
    user: &UserProfile,
    snapshot: &'a ProfileSnapshot,
    category: Category,
) -> Vec<&'a StoredProfile> {
    snapshot
        .iter()
        .filter(|candidate| candidate.profile.user_id != user.user_id)
        .filter(|candidate| candidate.profile.email_domain == user.email_domain)
        .filter(|candidate| match (category, user.gender) {
            (Category::Couple, Some(gender)) => candidate.profile.gender != Some(gender),
            _ => true,
        })
        .collect()
}
