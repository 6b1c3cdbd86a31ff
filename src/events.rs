//! Bounded in-memory log of attack occurrences
//!
//! Fixed-capacity FIFO: when full, the oldest entry is evicted on append.
//! Readers get an oldest-first snapshot; there is no deduplication.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

/// Attack category attached to log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackCategory {
    Injection,
    Xss,
    Csrf,
    RateLimit,
}

impl fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackCategory::Injection => write!(f, "injection"),
            AttackCategory::Xss => write!(f, "xss"),
            AttackCategory::Csrf => write!(f, "csrf"),
            AttackCategory::RateLimit => write!(f, "rate_limit"),
        }
    }
}

/// What the pipeline did with the offending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Blocked,
    Allowed,
    Throttled,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::Blocked => write!(f, "blocked"),
            EventAction::Allowed => write!(f, "allowed"),
            EventAction::Throttled => write!(f, "throttled"),
        }
    }
}

/// One logged attack occurrence
#[derive(Debug, Clone, Serialize)]
pub struct AttackEvent {
    /// Milliseconds since UNIX epoch
    pub timestamp_ms: u64,
    pub client: String,
    pub category: AttackCategory,
    pub action: EventAction,
}

impl AttackEvent {
    pub fn new(now_nanos: u64, client: &str, category: AttackCategory, action: EventAction) -> Self {
        Self {
            timestamp_ms: now_nanos / 1_000_000,
            client: client.to_string(),
            category,
            action,
        }
    }
}

/// Bounded FIFO event log shared across request tasks
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<AttackEvent>>,
}

impl EventLog {
    /// Capacity below 1 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an event, evicting the oldest entry when at capacity
    pub fn append(&self, event: AttackEvent) {
        let mut entries = self.entries.lock().expect("event log mutex poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Oldest-first copy of the current entries
    pub fn snapshot(&self) -> Vec<AttackEvent> {
        let entries = self.entries.lock().expect("event log mutex poisoned");
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("event log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64) -> AttackEvent {
        AttackEvent::new(
            seq * 1_000_000,
            "10.0.0.1",
            AttackCategory::Injection,
            EventAction::Blocked,
        )
    }

    #[test]
    fn test_append_below_capacity() {
        let log = EventLog::new(10);
        log.append(event(1));
        log.append(event(2));

        assert_eq!(log.len(), 2);
        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].timestamp_ms, 1);
        assert_eq!(snapshot[1].timestamp_ms, 2);
    }

    #[test]
    fn test_eviction_drops_oldest_first() {
        let log = EventLog::new(3);
        for seq in 1..=5 {
            log.append(event(seq));
        }

        assert_eq!(log.len(), 3);
        let timestamps: Vec<u64> = log.snapshot().iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(timestamps, vec![3, 4, 5]);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let log = EventLog::new(8);
        for seq in 0..100 {
            log.append(event(seq));
            assert!(log.len() <= 8);
        }
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let log = EventLog::new(0);
        log.append(event(1));
        log.append(event(2));

        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].timestamp_ms, 2);
    }

    #[test]
    fn test_timestamp_converted_to_millis() {
        let e = AttackEvent::new(
            1_500_000_000,
            "10.0.0.1",
            AttackCategory::Csrf,
            EventAction::Allowed,
        );
        assert_eq!(e.timestamp_ms, 1_500);
    }

    #[test]
    fn test_display_vocabulary() {
        assert_eq!(AttackCategory::RateLimit.to_string(), "rate_limit");
        assert_eq!(AttackCategory::Xss.to_string(), "xss");
        assert_eq!(EventAction::Throttled.to_string(), "throttled");
    }

    #[test]
    fn test_serializes_snake_case() {
        let e = event(1);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"category\":\"injection\""));
        assert!(json.contains("\"action\":\"blocked\""));
    }
}
