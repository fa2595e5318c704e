use sha2::{Digest, Sha256};

use crate::config::SuggestConfig;

/// Phrases that mark a verification statement as too uncertain to surface.
const LOW_CONFIDENCE_MARKERS: &[&str] = &[
    "cannot verify",
    "can't verify",
    "unable to verify",
    "unclear",
    "no information",
    "not enough information",
    "i don't know",
];

/// Generic filler that the rubric should already reject; belt and braces
/// on the way out.
const GENERIC_PATTERNS: &[&str] = &[
    "great point",
    "good question",
    "that's interesting",
    "keep up the good work",
    "stay engaged",
    "listen actively",
    "be prepared",
    "ask clarifying questions",
];

/// Hedge language in the user's own utterances that invites fact checking.
const HEDGE_PHRASES: &[&str] = &[
    "i think",
    "i believe",
    "maybe",
    "probably",
    "not sure",
    "i guess",
    "if i remember",
    "as far as i know",
];

/// Domains whose mention suggests a checkable factual claim.
const CLAIM_DOMAINS: &[&str] = &[
    "revenue",
    "funding",
    "valuation",
    "market share",
    "headcount",
    "employees",
    "users",
    "customers",
    "growth",
    "population",
    "percent",
    "million",
    "billion",
];

/// Normalized content hash: lowercased, punctuation stripped, whitespace
/// collapsed, truncated, then sha256. Near-identical wordings of the same
/// suggestion collapse to one hash.
pub fn normalized_hash(message: &str) -> String {
    let mut normalized = String::with_capacity(message.len());
    let mut last_was_space = true;
    for c in message.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                normalized.push(lc);
            }
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            normalized.push(' ');
            last_was_space = true;
        }
    }
    let truncated: String = normalized.trim_end().chars().take(120).collect();

    let digest = Sha256::digest(truncated.as_bytes());
    format!("{:x}", digest)
}

/// Length band + generic-pattern gate. Dedup is checked separately against
/// the store.
pub fn passes_quality(message: &str, cfg: &SuggestConfig) -> bool {
    let trimmed = message.trim();
    let len = trimmed.chars().count();
    if len < cfg.min_message_chars || len > cfg.max_message_chars {
        return false;
    }

    let lower = trimmed.to_lowercase();
    !GENERIC_PATTERNS.iter().any(|p| lower.contains(p))
}

pub fn is_hedged(text: &str) -> bool {
    let lower = text.to_lowercase();
    HEDGE_PHRASES.iter().any(|p| lower.contains(p))
}

pub fn mentions_claim_domain(text: &str) -> bool {
    let lower = text.to_lowercase();
    CLAIM_DOMAINS.iter().any(|p| lower.contains(p))
}

pub fn is_low_confidence(statement: &str) -> bool {
    let lower = statement.to_lowercase();
    LOW_CONFIDENCE_MARKERS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ignores_case_punctuation_and_spacing() {
        let a = normalized_hash("Their Series B was $40M, led by Acme.");
        let b = normalized_hash("their series b was 40m  led by acme");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_distinguishes_different_content() {
        let a = normalized_hash("Their Series B was $40M.");
        let b = normalized_hash("Their Series C was $90M.");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_truncation_collapses_long_tails() {
        let head = "x".repeat(120);
        let a = normalized_hash(&format!("{} tail one", head));
        let b = normalized_hash(&format!("{} tail two", head));
        assert_eq!(a, b);
    }
}
