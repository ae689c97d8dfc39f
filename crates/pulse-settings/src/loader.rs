//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PulseSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `PULSE_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PulseSettings;

/// Resolve the path to the settings file (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulse").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PulseSettings> {
    load_with(path, &|name| std::env::var(name).ok())
}

fn load_with(path: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<PulseSettings> {
    let defaults = serde_json::to_value(PulseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PulseSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PULSE_*` overrides read through `env`.
///
/// Invalid values are ignored with a warning (fall back to file/default).
fn apply_overrides(settings: &mut PulseSettings, env: &dyn Fn(&str) -> Option<String>) {
    let env = EnvReader(env);

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("PULSE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("PULSE_MAX_CONNECTIONS", 1, 100_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.string("PULSE_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Broadcast switches ──────────────────────────────────────────
    if let Some(v) = env.bool("PULSE_WEBSOCKET_ENABLED") {
        settings.broadcast.enabled = v;
    }
    if let Some(v) = env.bool("PULSE_SELECTIVE_SUBSCRIPTIONS") {
        settings.broadcast.selective_subscriptions = v;
    }

    // ── Per-topic sources ───────────────────────────────────────────
    if let Some(v) = env.bool("PULSE_METRICS") {
        settings.sources.topics.metrics = v;
    }
    if let Some(v) = env.bool("PULSE_CONTAINER_STATS") {
        settings.sources.topics.containers = v;
    }
    if let Some(v) = env.bool("PULSE_SESSIONS") {
        settings.sources.topics.sessions = v;
    }
    if let Some(v) = env.bool("PULSE_SESSION_EVENTS") {
        settings.sources.topics.session_events = v;
    }
    if let Some(v) = env.bool("PULSE_SYSTEM_ALERTS") {
        settings.sources.topics.system_alerts = v;
    }
    if let Some(v) = env.u64("PULSE_SAMPLE_INTERVAL_MS", 100, 3_600_000) {
        settings.sources.sample_interval_ms = v;
    }

    // ── Upstream ────────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_UPSTREAM_URL") {
        settings.upstream.base_url = v;
    }

    // ── Alerts ──────────────────────────────────────────────────────
    if let Some(v) = env.f64("PULSE_ALERT_CPU_THRESHOLD", 0.0, 100.0) {
        settings.alerts.cpu_threshold = v;
    }
    if let Some(v) = env.f64("PULSE_ALERT_MEMORY_THRESHOLD", 0.0, 100.0) {
        settings.alerts.memory_threshold = v;
    }
    if let Some(v) = env.f64("PULSE_ALERT_ERROR_RATE_THRESHOLD", 0.0, 1.0) {
        settings.alerts.error_rate_threshold = v;
    }
    if let Some(v) = env.u64("PULSE_ALERT_COOLDOWN_SECS", 0, 86_400) {
        settings.alerts.cooldown_secs = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a>(&'a dyn Fn(&str) -> Option<String>);

impl EnvReader<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.0)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }

    fn f64(&self, name: &str, min: f64, max: f64) -> Option<f64> {
        self.parsed(name, "f64", |v| parse_f64_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
