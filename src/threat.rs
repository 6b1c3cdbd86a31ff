//! Per-client threat state: rolling request windows, decaying threat scores,
//! temporary bans, and outcome counters
//!
//! Backed by DashMap so concurrent requests from one client serialize on that
//! client's entry guard; every compound read-modify-write sequence holds the
//! guard for its whole duration. Records are created lazily on first sight
//! and live for the process lifetime.

pub mod thresholds;

pub use thresholds::{ThresholdPolicy, Thresholds};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Score added when a signature rule matches
pub const SIGNATURE_PENALTY: f64 = 2.0;
/// Score added when the CSRF heuristic flags a request
pub const CSRF_PENALTY: f64 = 0.5;
/// Score added when a client crosses the block threshold
pub const RATE_LIMIT_PENALTY: f64 = 1.0;
/// Score added when a client crosses the throttle threshold
pub const THROTTLE_PENALTY: f64 = 0.25;

/// Why a request was allowed, throttled, or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    Normal,
    CsrfSuspected,
    Injection,
    Xss,
    TemporaryBan,
    RateLimitExceeded,
    Throttled,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Normal => write!(f, "NORMAL"),
            DecisionReason::CsrfSuspected => write!(f, "CSRF_SUSPECTED"),
            DecisionReason::Injection => write!(f, "INJECTION"),
            DecisionReason::Xss => write!(f, "XSS"),
            DecisionReason::TemporaryBan => write!(f, "TEMPORARY_BAN"),
            DecisionReason::RateLimitExceeded => write!(f, "RATE_LIMIT_EXCEEDED"),
            DecisionReason::Throttled => write!(f, "THROTTLED"),
        }
    }
}

/// Outcome of the rate/threat evaluation for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    Allowed,
    Throttled,
    Banned,
}

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub window_secs: u64,
    pub ban_duration_secs: u64,
    pub decay_rate_per_sec: f64,
    pub thresholds: ThresholdPolicy,
}

impl TrackerConfig {
    fn window_nanos(&self) -> u64 {
        self.window_secs * 1_000_000_000
    }

    fn ban_duration_nanos(&self) -> u64 {
        self.ban_duration_secs * 1_000_000_000
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_secs: 10,
            ban_duration_secs: 60,
            decay_rate_per_sec: 0.05,
            thresholds: ThresholdPolicy::default(),
        }
    }
}

/// Mutable per-client state
#[derive(Debug, Clone)]
pub struct ClientRecord {
    /// Requests seen in the current window
    pub window_count: u32,
    /// Window anchor (nanoseconds since UNIX epoch)
    pub window_start_nanos: u64,
    /// Set iff the client is currently banned
    pub banned_at_nanos: Option<u64>,
    pub total_allowed: u64,
    pub total_blocked: u64,
    pub last_deny_reason: Option<DecisionReason>,
    /// Never negative; decays with elapsed time, jumps on violations
    pub threat_score: f64,
    pub last_activity_nanos: u64,
}

impl ClientRecord {
    pub fn new(now_nanos: u64) -> Self {
        Self {
            window_count: 0,
            window_start_nanos: now_nanos,
            banned_at_nanos: None,
            total_allowed: 0,
            total_blocked: 0,
            last_deny_reason: None,
            threat_score: 0.0,
            last_activity_nanos: now_nanos,
        }
    }

    /// Apply time-proportional score decay and advance the activity marker
    pub fn decay(&mut self, now_nanos: u64, rate_per_sec: f64) {
        let elapsed_secs =
            now_nanos.saturating_sub(self.last_activity_nanos) as f64 / 1_000_000_000.0;
        self.threat_score = (self.threat_score - elapsed_secs * rate_per_sec).max(0.0);
        self.last_activity_nanos = now_nanos;
    }

    /// Ban status with lazy expiry: clears the ban once the duration has passed
    pub fn is_banned(&mut self, now_nanos: u64, ban_duration_nanos: u64) -> bool {
        match self.banned_at_nanos {
            Some(banned_at) if now_nanos.saturating_sub(banned_at) < ban_duration_nanos => true,
            Some(_) => {
                self.banned_at_nanos = None;
                false
            }
            None => false,
        }
    }

    pub fn apply_penalty(&mut self, delta: f64) {
        self.threat_score += delta;
    }

    /// Start a fresh window once the current one has fully elapsed
    pub fn reset_window_if_elapsed(&mut self, now_nanos: u64, window_nanos: u64) {
        if now_nanos.saturating_sub(self.window_start_nanos) > window_nanos {
            self.window_count = 0;
            self.window_start_nanos = now_nanos;
        }
    }

    pub fn record_outcome(&mut self, allowed: bool, reason: DecisionReason) {
        if allowed {
            self.total_allowed += 1;
        } else {
            self.total_blocked += 1;
            self.last_deny_reason = Some(reason);
        }
    }
}

/// Read-only view of one client for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub client: String,
    pub window_count: u32,
    pub banned: bool,
    pub total_allowed: u64,
    pub total_blocked: u64,
    pub last_deny_reason: Option<DecisionReason>,
    /// Rounded to two decimals
    pub threat_score: f64,
}

/// Shared tracker of per-client records and global outcome counters
pub struct ThreatTracker {
    clients: DashMap<String, ClientRecord>,
    config: TrackerConfig,
    total_allowed: AtomicU64,
    total_blocked: AtomicU64,
}

impl ThreatTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            clients: DashMap::new(),
            config,
            total_allowed: AtomicU64::new(0),
            total_blocked: AtomicU64::new(0),
        }
    }

    /// Decay then raise the client's threat score, returning the new value
    ///
    /// Creates the record on first sight. Runs under the client's entry
    /// guard, so the returned score reflects exactly this penalty.
    pub fn penalize(&self, client: &str, delta: f64, now_nanos: u64) -> f64 {
        let mut record = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientRecord::new(now_nanos));

        record.decay(now_nanos, self.config.decay_rate_per_sec);
        record.apply_penalty(delta);
        record.threat_score
    }

    /// Whether the client is currently banned (lazily clearing expired bans)
    pub fn is_banned(&self, client: &str, now_nanos: u64) -> bool {
        match self.clients.get_mut(client) {
            Some(mut record) => record.is_banned(now_nanos, self.config.ban_duration_nanos()),
            None => false,
        }
    }

    /// Record the terminal outcome for a request decided outside the rate stage
    pub fn record_outcome(
        &self,
        client: &str,
        allowed: bool,
        reason: DecisionReason,
        now_nanos: u64,
    ) {
        let mut record = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientRecord::new(now_nanos));

        record.record_outcome(allowed, reason);
        drop(record);

        self.bump_totals(allowed);
    }

    /// Rate/threat evaluation: window reset, decay, adaptive thresholds,
    /// window increment, and the allow/throttle/ban comparison
    ///
    /// The whole sequence runs under the client's entry guard; the outcome
    /// (including ban imposition and the matching penalty) is recorded
    /// before the guard is released. `allow_reason` is stamped on a plain
    /// allow so an earlier soft flag survives into the recorded outcome.
    pub fn evaluate_rate(
        &self,
        client: &str,
        allow_reason: DecisionReason,
        now_nanos: u64,
    ) -> RateOutcome {
        let mut record = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientRecord::new(now_nanos));

        record.reset_window_if_elapsed(now_nanos, self.config.window_nanos());
        record.decay(now_nanos, self.config.decay_rate_per_sec);
        let thresholds = self.config.thresholds.thresholds_for(record.threat_score);
        record.window_count = record.window_count.saturating_add(1);

        let outcome = if record.window_count > thresholds.block {
            record.banned_at_nanos = Some(now_nanos);
            record.apply_penalty(RATE_LIMIT_PENALTY);
            record.record_outcome(false, DecisionReason::RateLimitExceeded);
            RateOutcome::Banned
        } else if record.window_count > thresholds.throttle {
            record.apply_penalty(THROTTLE_PENALTY);
            record.record_outcome(true, DecisionReason::Throttled);
            RateOutcome::Throttled
        } else {
            record.record_outcome(true, allow_reason);
            RateOutcome::Allowed
        };
        drop(record);

        self.bump_totals(outcome != RateOutcome::Banned);
        outcome
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_allowed.load(Ordering::Relaxed),
            self.total_blocked.load(Ordering::Relaxed),
        )
    }

    /// Per-client views for the stats surface, sorted by client identifier
    ///
    /// Does not mutate records: the ban flag is computed against `now_nanos`
    /// without triggering lazy expiry.
    pub fn snapshot(&self, now_nanos: u64) -> Vec<ClientSnapshot> {
        let mut clients: Vec<ClientSnapshot> = self
            .clients
            .iter()
            .map(|entry| {
                let record = entry.value();
                ClientSnapshot {
                    client: entry.key().clone(),
                    window_count: record.window_count,
                    banned: record
                        .banned_at_nanos
                        .map(|at| {
                            now_nanos.saturating_sub(at) < self.config.ban_duration_nanos()
                        })
                        .unwrap_or(false),
                    total_allowed: record.total_allowed,
                    total_blocked: record.total_blocked,
                    last_deny_reason: record.last_deny_reason,
                    threat_score: (record.threat_score * 100.0).round() / 100.0,
                }
            })
            .collect();

        clients.sort_by(|a, b| a.client.cmp(&b.client));
        clients
    }

    fn bump_totals(&self, allowed: bool) {
        if allowed {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }
}
