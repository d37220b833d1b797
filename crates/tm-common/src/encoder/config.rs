use std::time::Duration;

use strum::{AsRefStr, EnumString};
use tracing::warn;

pub const DEFAULT_DIMENSION: usize = 768;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EncoderKind {
    #[default]
    Hash,
    Http,
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub kind: EncoderKind,
    pub dimension: usize,
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            kind: EncoderKind::Hash,
            dimension: DEFAULT_DIMENSION,
            endpoint: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

impl EncoderConfig {
    pub fn from_env() -> Self {
        fn parse_usize(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        }

        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        }

        let kind = match std::env::var("TM_ENCODER") {
            Ok(raw) => raw.trim().to_ascii_lowercase().parse().unwrap_or_else(|_| {
                warn!(encoder = %raw, "unknown TM_ENCODER; using hash encoder");
                EncoderKind::Hash
            }),
            Err(_) => EncoderKind::Hash,
        };

        Self {
            kind,
            dimension: parse_usize("TM_ENCODER_DIMENSION", DEFAULT_DIMENSION),
            endpoint: std::env::var("TM_ENCODER_ENDPOINT")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            timeout: Duration::from_secs(parse_u64(
                "TM_ENCODER_TIMEOUT_SECONDS",
                DEFAULT_TIMEOUT_SECONDS,
            )),
        }
    }
}
