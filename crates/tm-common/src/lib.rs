pub mod consistency;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod matching;
pub mod metadata;
pub mod profile;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::{MatchingError, ValidationError};
pub use matching::Category;
pub use profile::UserProfile;

/// Round a score to six decimal places, the precision every persisted score carries.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
