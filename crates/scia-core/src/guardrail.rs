//! Input and output guardrails around the orchestration graph.
//!
//! Input checks run in a fixed order and stop at the first failure. Output
//! sanitization is a pure text transform with no failure path, and applying
//! it twice gives the same text as applying it once.

use std::fmt;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Longest accepted query, in characters.
pub const MAX_INPUT_LENGTH: usize = 1000;

/// Returned by [`check_output`] when there is nothing to sanitize.
pub const EMPTY_OUTPUT_MESSAGE: &str =
    "The agents were unable to generate a response. Please try rephrasing your query.";

/// Appended when the report contains a hallucination indicator.
pub const HALLUCINATION_NOTE: &str = "\n\n> **Note:** Some parts of this response may contain \
uncertain information. Please verify against actual data.";

/// Footer carried by every sanitized report.
pub const DISCLAIMER: &str = "\n\n---\n*This analysis is based on sample data and AI-generated \
insights. Verify findings against actual systems before making business decisions.*";

/// Supply-chain vocabulary; a query must mention at least one of these.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    "supply", "chain", "inventory", "stock", "stockout", "demand", "forecast",
    "supplier", "product", "order", "reorder", "lead time", "warehouse",
    "shipment", "logistics", "procurement", "cost", "price", "sales",
    "shortage", "surplus", "report", "analysis", "trend", "risk",
    "performance", "delivery", "fulfillment", "p001", "p002", "p003",
    "p004", "p005", "lay's", "pepsi", "doritos", "gatorade", "quaker",
];

/// Phrases that try to override instructions, swap persona, or pull the system prompt.
pub const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(previous|above|prior)\s+(instructions|prompts|rules)",
    r"forget\s+(your|all)\s+(instructions|rules|guidelines)",
    r"you\s+are\s+now\s+a",
    r"new\s+instructions?:",
    r"system\s*prompt:",
    r"act\s+as\s+(if\s+you\s+are|a)\s+",
    r"pretend\s+(you\s+are|to\s+be)",
    r"disregard\s+(all|your|previous)",
    r"override\s+(your|the)\s+(instructions|rules|system)",
    r"reveal\s+(your|the)\s+system\s+prompt",
    r"jailbreak",
    r"\[system\]",
    r"<\s*system\s*>",
];

/// Sensitive data patterns and their replacement placeholders, applied in order.
pub const REDACTION_RULES: &[(&str, &str)] = &[
    (r"\b\d{3}-\d{2}-\d{4}\b", "[SSN REDACTED]"),
    (r"\b\d{16}\b", "[CARD NUMBER REDACTED]"),
    (
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        "[EMAIL REDACTED]",
    ),
    (
        r"(?i)(api[_\s]?key|secret[_\s]?key|password)[ \t]*[:=][ \t]*\S+",
        "[CREDENTIAL REDACTED]",
    ),
];

/// Phrases suggesting the model is guessing rather than reporting data.
pub const HALLUCINATION_INDICATORS: &[&str] = &[
    "as an ai",
    "i don't have access to real",
    "i don't have real-time access",
    "i cannot access real-time",
    "hypothetical",
    "i'm making this up",
    "i don't actually know",
];

/// Why a query was refused at the input boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooLong { length: usize, limit: usize },
    Injection,
    OutOfDomain,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Please enter a query about your supply chain."),
            Self::TooLong { length, limit } => write!(
                f,
                "Query too long ({} chars). Please keep it under {} characters.",
                length, limit
            ),
            Self::Injection => write!(
                f,
                "Your query was blocked by our safety filter. Please ask a question about \
                 supply chain operations."
            ),
            Self::OutOfDomain => write!(
                f,
                "This system is designed for supply chain analysis. Please ask about \
                 inventory, demand, suppliers, products, or logistics."
            ),
        }
    }
}

/// Compiled guardrail patterns.
pub struct Guardrails {
    injection: Vec<Regex>,
    redactions: Vec<(Regex, &'static str)>,
}

impl Guardrails {
    /// Compile the built-in pattern lists. Invalid patterns are skipped with a warning.
    pub fn new() -> Self {
        let injection = INJECTION_PATTERNS
            .iter()
            .filter_map(|p| {
                match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(pattern = %p, error = %e, "Invalid injection pattern regex, skipping");
                        None
                    }
                }
            })
            .collect();

        let redactions = REDACTION_RULES
            .iter()
            .filter_map(|(p, replacement)| match Regex::new(p) {
                Ok(re) => Some((re, *replacement)),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Invalid redaction pattern regex, skipping");
                    None
                }
            })
            .collect();

        Self {
            injection,
            redactions,
        }
    }

    /// Process-wide compiled instance.
    pub fn shared() -> &'static Guardrails {
        static SHARED: OnceLock<Guardrails> = OnceLock::new();
        SHARED.get_or_init(Guardrails::new)
    }

    /// Validate a raw query before it enters the graph.
    pub fn check_input(&self, query: &str) -> std::result::Result<(), Rejection> {
        if query.trim().is_empty() {
            return Err(Rejection::Empty);
        }

        let length = query.chars().count();
        if length > MAX_INPUT_LENGTH {
            return Err(Rejection::TooLong {
                length,
                limit: MAX_INPUT_LENGTH,
            });
        }

        if self.injection.iter().any(|re| re.is_match(query)) {
            let preview: String = query.chars().take(100).collect();
            warn!(query = %preview, "Prompt injection attempt blocked");
            return Err(Rejection::Injection);
        }

        let lower = query.to_lowercase();
        if !DOMAIN_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Err(Rejection::OutOfDomain);
        }

        Ok(())
    }

    /// Sanitize a report before it reaches the caller.
    pub fn check_output(&self, response: &str) -> String {
        if response.trim().is_empty() || response == EMPTY_OUTPUT_MESSAGE {
            return EMPTY_OUTPUT_MESSAGE.to_string();
        }

        // Footers from an earlier pass are set aside so the redactions only see the body.
        let body = response.strip_suffix(DISCLAIMER).unwrap_or(response);
        let (body, noted) = match body.strip_suffix(HALLUCINATION_NOTE) {
            Some(body) => (body, true),
            None => (body, false),
        };

        let mut text = body.to_string();
        for (re, replacement) in &self.redactions {
            text = re.replace_all(&text, *replacement).into_owned();
        }

        let lower = text.to_lowercase();
        let flagged = HALLUCINATION_INDICATORS.iter().any(|ind| lower.contains(ind));
        if flagged && !noted {
            warn!("Potential hallucination detected in output");
        }
        if flagged || noted {
            text.push_str(HALLUCINATION_NOTE);
        }

        text.push_str(DISCLAIMER);
        text
    }
}

impl Default for Guardrails {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Guardrails::check_input`] on the shared instance.
pub fn check_input(query: &str) -> std::result::Result<(), Rejection> {
    Guardrails::shared().check_input(query)
}

/// [`Guardrails::check_output`] on the shared instance.
pub fn check_output(response: &str) -> String {
    Guardrails::shared().check_output(response)
}
