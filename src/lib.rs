//! Adaptive HTTP Firewall - Inline traffic inspection proxy
//!
//! Reverse proxy that vets every request before it reaches the upstream:
//! - Signature matching (SQL injection, script injection)
//! - CSRF heuristic with score-based escalation
//! - Per-client threat tracking with adaptive rate thresholds
//! - Temporary bans and request throttling
//! - Operator dashboard and statistics endpoint

pub mod config;
pub mod error;
pub mod events;
pub mod inspect;
pub mod proxy;
pub mod server;
pub mod threat;
