//! Cross-site request forgery heuristic
//!
//! Flags state-mutating requests that arrive without any browsing context
//! (neither Origin nor Referer) or from an Origin outside the trusted
//! prefix. Advisory only: the pipeline decides what a flag costs.

use hyper::header::{ORIGIN, REFERER};
use hyper::{HeaderMap, Method};

/// Heuristic carrying the origin prefix considered first-party
#[derive(Debug, Clone)]
pub struct CsrfHeuristic {
    safe_origin: String,
}

impl CsrfHeuristic {
    pub fn new(safe_origin: String) -> Self {
        Self { safe_origin }
    }

    /// Whether this request looks like a cross-site state mutation
    ///
    /// An Origin that is present but unreadable counts as absent, so the
    /// Referer presence check still applies.
    pub fn is_suspicious(&self, method: &Method, headers: &HeaderMap) -> bool {
        if !is_state_mutating(method) {
            return false;
        }

        let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        let referer = headers.get(REFERER).and_then(|v| v.to_str().ok());

        match origin {
            Some(origin) => !origin.starts_with(&self.safe_origin),
            None => referer.is_none(),
        }
    }
}

fn is_state_mutating(method: &Method) -> bool {
    matches!(method.as_str(), "POST" | "PUT" | "DELETE" | "PATCH")
}
