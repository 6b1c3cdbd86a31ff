//! Static attack-signature rules
//!
//! Data-driven table of compiled patterns covering injection and
//! script-injection payloads. Evaluation is an ordered OR per category,
//! short-circuiting at the first match.

use regex::Regex;

use crate::events::AttackCategory;

/// Rule severity, carried into structured logs on match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One compiled signature rule
#[derive(Debug)]
pub struct SignatureRule {
    pub id: u32,
    pub category: AttackCategory,
    pub severity: Severity,
    pub description: &'static str,
    pattern: Regex,
}

type RuleDef = (u32, AttackCategory, Severity, &'static str, &'static str);

const RULE_DEFS: &[RuleDef] = &[
    (
        1001,
        AttackCategory::Injection,
        Severity::High,
        "boolean tautology",
        r"(?i)(\bor\b|\band\b)\s+\d+=\d+",
    ),
    (
        1002,
        AttackCategory::Injection,
        Severity::Low,
        "comment terminator",
        r"(--|#)",
    ),
    (
        1003,
        AttackCategory::Injection,
        Severity::Critical,
        "union select",
        r"(?i)\bunion\b.*\bselect\b",
    ),
    (
        1004,
        AttackCategory::Injection,
        Severity::High,
        "select from",
        r"(?i)\bselect\b.*\bfrom\b",
    ),
    (
        1005,
        AttackCategory::Injection,
        Severity::Medium,
        "destructive statement keyword",
        r"(?i)\b(drop|delete|insert|update)\b",
    ),
    (
        1006,
        AttackCategory::Injection,
        Severity::Critical,
        "quoted tautology",
        r#"(?i)('|")\s*or\s*('|")?\d+('|")?\s*=\s*('|")?\d+"#,
    ),
    (
        2001,
        AttackCategory::Xss,
        Severity::Critical,
        "script tag open",
        r"(?i)<\s*script\b",
    ),
    (
        2002,
        AttackCategory::Xss,
        Severity::High,
        "script tag close",
        r"(?i)</\s*script\s*>",
    ),
    (
        2003,
        AttackCategory::Xss,
        Severity::High,
        "javascript uri scheme",
        r"(?i)javascript\s*:",
    ),
    (
        2004,
        AttackCategory::Xss,
        Severity::High,
        "onerror handler attribute",
        r"(?i)onerror\s*=",
    ),
    (
        2005,
        AttackCategory::Xss,
        Severity::High,
        "onload handler attribute",
        r"(?i)onload\s*=",
    ),
    (
        2006,
        AttackCategory::Xss,
        Severity::Medium,
        "alert call",
        r"(?i)alert\s*\(",
    ),
    (
        2007,
        AttackCategory::Xss,
        Severity::Medium,
        "img tag open",
        r"(?i)<\s*img\b",
    ),
    (
        2008,
        AttackCategory::Xss,
        Severity::High,
        "iframe tag open",
        r"(?i)<\s*iframe\b",
    ),
];

/// Compiled rule table
pub struct SignatureEngine {
    rules: Vec<SignatureRule>,
}

impl SignatureEngine {
    /// Compile the built-in rule table
    pub fn builtin() -> Self {
        let rules = RULE_DEFS
            .iter()
            .map(|&(id, category, severity, description, pattern)| SignatureRule {
                id,
                category,
                severity,
                description,
                pattern: Regex::new(pattern).expect("built-in signature pattern must compile"),
            })
            .collect();

        Self { rules }
    }

    /// First rule of the given category matching the payload, if any
    pub fn first_match(&self, category: AttackCategory, payload: &str) -> Option<&SignatureRule> {
        if payload.is_empty() {
            return None;
        }

        self.rules
            .iter()
            .filter(|rule| rule.category == category)
            .find(|rule| rule.pattern.is_match(payload))
    }
}

impl Default for SignatureEngine {
    fn default() -> Self {
        Self::builtin()
    }
}
