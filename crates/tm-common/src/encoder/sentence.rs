use crate::profile::UserProfile;

fn list_sentence(values: &[String], render: impl Fn(&str) -> String) -> Option<String> {
    let items: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(render(&items.join(", ")))
    }
}

/// Render the profile as natural-language text for the sentence encoder.
///
/// MBTI, gender, email domain and age group are never rendered; they are handled by
/// the rules and the cohort filter instead.
pub fn profile_to_sentence(profile: &UserProfile) -> String {
    let sentences = [
        profile
            .religion
            .map(|v| format!("My religion is {}.", v.label())),
        profile
            .smoking
            .map(|v| format!("When it comes to smoking, I am {}.", v.label())),
        profile
            .drinking
            .map(|v| format!("When it comes to alcohol, I am {}.", v.label())),
        list_sentence(&profile.personality, |v| {
            format!("My personality is {v}.")
        }),
        list_sentence(&profile.preferred_people, |v| {
            format!("The kind of people I like are {v}.")
        }),
        list_sentence(&profile.current_interests, |v| {
            format!("These days I am interested in {v}.")
        }),
        list_sentence(&profile.favorite_foods, |v| {
            format!("My favorite foods are {v}.")
        }),
        list_sentence(&profile.liked_sports, |v| {
            format!("The sports I enjoy are {v}.")
        }),
        list_sentence(&profile.pets, |v| format!("I live with {v}.")),
        list_sentence(&profile.self_development, |v| {
            format!("For self-development I am working on {v}.")
        }),
        list_sentence(&profile.hobbies, |v| format!("My hobbies are {v}.")),
    ];

    sentences.into_iter().flatten().collect::<Vec<_>>().join(" ")
}
