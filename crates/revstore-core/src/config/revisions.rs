//! Revision allocation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for revision number allocation.
///
/// A conflicting insert is retried with exponential backoff:
/// `base_delay_ms * 2^(attempt - 1)`, capped at `max_delay_ms`, with up to
/// half of the delay added as jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// Total attempts (first try included) before a conflict is surfaced.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl RevisionConfig {
    /// Backoff delay (without jitter) to wait after the given failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    8
}

fn default_base_delay() -> u64 {
    5
}

fn default_max_delay() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cfg = RevisionConfig {
            max_attempts: 10,
            base_delay_ms: 10,
            max_delay_ms: 100,
        };
        assert_eq!(cfg.backoff(1), Duration::from_millis(10));
        assert_eq!(cfg.backoff(2), Duration::from_millis(20));
        assert_eq!(cfg.backoff(3), Duration::from_millis(40));
        assert_eq!(cfg.backoff(5), Duration::from_millis(100));
        assert_eq!(cfg.backoff(40), Duration::from_millis(100));
    }
}
