//! Retry policy for asset acquisition.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retries within one relaxation level, with progressive backoff.
///
/// Attempts past the end of the backoff schedule reuse its last entry, so a
/// policy with more attempts than delays stays well defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts_per_level: u32,
    /// Delay before retry N (1-based); indexes past the end clamp to the
    /// last entry
    #[serde(with = "backoff_secs")]
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_level: 3,
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts_per_level: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts_per_level,
            backoff,
        }
    }

    /// Backoff delay before retry `attempt` (1-based). `None` when no delay
    /// applies (first attempt, or an empty schedule).
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || self.backoff.is_empty() {
            return None;
        }
        let idx = (attempt as usize - 1).min(self.backoff.len() - 1);
        Some(self.backoff[idx])
    }
}

mod backoff_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        v.iter()
            .map(|d| d.as_secs_f64())
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let secs = Vec::<f64>::deserialize(d)?;
        Ok(secs.into_iter().map(Duration::from_secs_f64).collect())
    }
}
