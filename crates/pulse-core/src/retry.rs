//! Reconnect backoff.
//!
//! - [`ReconnectConfig`]: bounds for the delay between attempts
//! - [`calculate_backoff_delay`]: pure exponential backoff math
//! - [`ReconnectBackoff`]: attempt counter that walks the sequence and resets

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default first delay in milliseconds.
pub const DEFAULT_MIN_DELAY_MS: u64 = 1000;
/// Default delay ceiling in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Bounds for reconnect delays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Delay before the first retry (default: 1000).
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Delay ceiling (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_min_delay_ms() -> u64 {
    DEFAULT_MIN_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff: `min(max_delay, base_delay * 2^attempt)`.
///
/// `attempt` is zero-based. The shift saturates so huge attempt counts stay
/// at the ceiling instead of overflowing.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

/// Walks the backoff sequence across consecutive failures.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectBackoff {
    /// Start at the minimum delay.
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay to wait before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let ms = calculate_backoff_delay(
            self.attempt,
            self.config.min_delay_ms,
            self.config.max_delay_ms,
        );
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(ms)
    }

    /// Back to the minimum after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
