//! Request decision pipeline
//!
//! Turns one request into one verdict. Stages run in a fixed order and the
//! first terminal stage wins:
//!
//! 1. Injection signatures (block)
//! 2. Script-injection signatures (block)
//! 3. CSRF heuristic (soft flag; blocks only past the escalation threshold)
//! 4. Existing temporary ban (block)
//! 5. Rate/threat evaluation (ban, throttle, or allow)

pub mod csrf;
pub mod signature;

pub use csrf::CsrfHeuristic;
pub use signature::{Severity, SignatureEngine, SignatureRule};

use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};

use crate::events::{AttackCategory, AttackEvent, EventAction, EventLog};
use crate::threat::{
    DecisionReason, RateOutcome, ThreatTracker, CSRF_PENALTY, SIGNATURE_PENALTY,
};

/// Final decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward to the upstream
    Allow { reason: DecisionReason },
    /// Forward after holding the request for `delay`
    Throttle { delay: Duration },
    /// Reject with 403
    Block { reason: DecisionReason },
}

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Threat score above which a CSRF flag escalates to a block
    pub csrf_block_threshold: f64,
    /// Hold time applied to throttled requests
    pub throttle_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            csrf_block_threshold: 3.0,
            throttle_delay: Duration::from_millis(500),
        }
    }
}

/// Per-request orchestrator over signatures, the CSRF heuristic, and the
/// threat tracker
pub struct DecisionPipeline {
    signatures: SignatureEngine,
    csrf: CsrfHeuristic,
    tracker: Arc<ThreatTracker>,
    events: Arc<EventLog>,
    config: PipelineConfig,
}

impl DecisionPipeline {
    pub fn new(
        signatures: SignatureEngine,
        csrf: CsrfHeuristic,
        tracker: Arc<ThreatTracker>,
        events: Arc<EventLog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            signatures,
            csrf,
            tracker,
            events,
            config,
        }
    }

    /// Decide what happens to one request
    ///
    /// Counters are committed exactly once per call, at the terminal stage.
    /// A CSRF flag that does not escalate carries through as the allow
    /// reason instead of committing its own outcome.
    pub fn evaluate(&self, parts: &Parts, body: &[u8], client: &str, now_nanos: u64) -> Verdict {
        let payload = assemble_payload(parts, body);

        if let Some(rule) = self.signatures.first_match(AttackCategory::Injection, &payload) {
            return self.block_for_signature(rule, client, DecisionReason::Injection, now_nanos);
        }

        if let Some(rule) = self.signatures.first_match(AttackCategory::Xss, &payload) {
            return self.block_for_signature(rule, client, DecisionReason::Xss, now_nanos);
        }

        let mut allow_reason = DecisionReason::Normal;
        if self.csrf.is_suspicious(&parts.method, &parts.headers) {
            let score = self.tracker.penalize(client, CSRF_PENALTY, now_nanos);
            if score > self.config.csrf_block_threshold {
                self.tracker
                    .record_outcome(client, false, DecisionReason::CsrfSuspected, now_nanos);
                self.events.append(AttackEvent::new(
                    now_nanos,
                    client,
                    AttackCategory::Csrf,
                    EventAction::Blocked,
                ));
                tracing::warn!(%client, score, "CSRF flag escalated to block");
                return Verdict::Block {
                    reason: DecisionReason::CsrfSuspected,
                };
            }

            self.events.append(AttackEvent::new(
                now_nanos,
                client,
                AttackCategory::Csrf,
                EventAction::Allowed,
            ));
            tracing::info!(%client, score, "CSRF suspected, request allowed");
            allow_reason = DecisionReason::CsrfSuspected;
        }

        if self.tracker.is_banned(client, now_nanos) {
            // The ban was logged when imposed; denials during it are not re-logged
            self.tracker
                .record_outcome(client, false, DecisionReason::TemporaryBan, now_nanos);
            tracing::warn!(%client, "Request rejected by active ban");
            return Verdict::Block {
                reason: DecisionReason::TemporaryBan,
            };
        }

        match self.tracker.evaluate_rate(client, allow_reason, now_nanos) {
            RateOutcome::Banned => {
                self.events.append(AttackEvent::new(
                    now_nanos,
                    client,
                    AttackCategory::RateLimit,
                    EventAction::Blocked,
                ));
                tracing::warn!(%client, "Rate limit exceeded, client banned");
                Verdict::Block {
                    reason: DecisionReason::RateLimitExceeded,
                }
            }
            RateOutcome::Throttled => {
                self.events.append(AttackEvent::new(
                    now_nanos,
                    client,
                    AttackCategory::RateLimit,
                    EventAction::Throttled,
                ));
                tracing::info!(%client, "Request throttled");
                Verdict::Throttle {
                    delay: self.config.throttle_delay,
                }
            }
            RateOutcome::Allowed => Verdict::Allow {
                reason: allow_reason,
            },
        }
    }

    fn block_for_signature(
        &self,
        rule: &SignatureRule,
        client: &str,
        reason: DecisionReason,
        now_nanos: u64,
    ) -> Verdict {
        self.tracker.penalize(client, SIGNATURE_PENALTY, now_nanos);
        self.tracker.record_outcome(client, false, reason, now_nanos);
        self.events.append(AttackEvent::new(
            now_nanos,
            client,
            rule.category,
            EventAction::Blocked,
        ));
        tracing::warn!(
            %client,
            rule = rule.id,
            severity = ?rule.severity,
            description = rule.description,
            "Signature match, request blocked"
        );
        Verdict::Block { reason }
    }
}

/// Plain-text 403 for a blocked request
pub fn deny_response(reason: DecisionReason) -> Response<Full<Bytes>> {
    let message = match reason {
        DecisionReason::Injection => "BLOCKED - SQL INJECTION DETECTED",
        DecisionReason::Xss => "BLOCKED - XSS DETECTED",
        DecisionReason::CsrfSuspected => "BLOCKED - CSRF SUSPECTED",
        DecisionReason::TemporaryBan => "BLOCKED BY FIREWALL",
        DecisionReason::RateLimitExceeded => "BLOCKED - RATE LIMIT EXCEEDED",
        DecisionReason::Normal | DecisionReason::Throttled => "BLOCKED",
    };

    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(message)))
        .unwrap()
}

/// Build the text the signature rules scan: raw query string, body, and
/// serialized header pairs, URL-decoded once at the end
fn assemble_payload(parts: &Parts, body: &[u8]) -> String {
    let mut raw = String::new();

    if let Some(query) = parts.uri.query() {
        raw.push_str(query);
    }

    raw.push_str(&String::from_utf8_lossy(body));

    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| format!("{}:{}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join(" ");
    raw.push_str(&headers);

    url_decode(&raw)
}

/// Percent-decode with `+` as space
///
/// Invalid escapes pass through untouched and undecodable byte sequences
/// degrade lossily; this never fails.
fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
