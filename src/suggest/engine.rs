use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::dedup::DedupStore;
use super::filter;
use super::Suggestion;
use crate::config::SuggestConfig;
use crate::providers::{LlmClient, SearchClient};
use crate::session::transcript::TranscriptEntry;

const RUBRIC_PROMPT: &str = "You analyze a live meeting transcript and produce \
at most 3 suggestions for the participant. Every suggestion must be concrete, \
non-obvious, 20-80 words long, and reference the supplied meeting context or \
transcript directly. Never produce generic advice or restate what was said. \
If nothing clears that bar, return an empty array. Respond with only a JSON \
array of objects: {\"type\": \"insight\"|\"question\", \"message\": \"...\", \
\"severity\": \"info\"|\"suggestion\"|\"warning\"}.";

const QUERY_PROMPT: &str = "The following are a speaker's recent statements \
that may contain uncertain or checkable factual claims. Write up to 3 short \
web search queries that would verify them, one per line, nothing else. If no \
claim is checkable, respond with an empty line.";

const VERIFY_PROMPT: &str = "Using only the search results below, write one \
short verification statement (1-2 sentences) about the speaker's claim, \
including the corrected figure or fact if the claim looks wrong. If the \
results do not settle it, say 'cannot verify'.";

/// Raw suggestion as produced by the LLM before filtering.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_severity() -> String {
    "suggestion".to_string()
}

/// Owns the analysis cadence and the dedup store. The network-facing
/// `analyze` pass runs in a spawned task; `admit` runs back on the session
/// dispatch loop so the store never needs a lock.
pub struct SuggestionEngine {
    cfg: SuggestConfig,
    dedup: DedupStore,
    last_cycle: Instant,
    fresh_entries: usize,
}

impl SuggestionEngine {
    pub fn new(cfg: SuggestConfig) -> Self {
        let ttl = Duration::from_secs(cfg.dedup_ttl_secs);
        Self {
            cfg,
            dedup: DedupStore::new(ttl),
            last_cycle: Instant::now(),
            fresh_entries: 0,
        }
    }

    /// A transcript entry was appended since the last cycle.
    pub fn note_entry(&mut self) {
        self.fresh_entries += 1;
    }

    /// Trigger check: (interval elapsed AND buffer non-empty) OR enough
    /// fresh entries accumulated, whichever comes first.
    pub fn should_analyze(&self, buffer_len: usize) -> bool {
        if buffer_len == 0 || self.fresh_entries == 0 {
            return false;
        }
        if self.fresh_entries >= self.cfg.buffer_threshold {
            return true;
        }
        self.last_cycle.elapsed() >= Duration::from_secs(self.cfg.analysis_interval_secs)
    }

    pub fn note_cycle_started(&mut self) {
        self.last_cycle = Instant::now();
        self.fresh_entries = 0;
    }

    /// Quality-filter and deduplicate candidates, capping at the per-cycle
    /// maximum. Accepted hashes enter the dedup store with the fixed TTL.
    pub fn admit(&mut self, candidates: Vec<Candidate>) -> Vec<Suggestion> {
        let mut accepted = Vec::new();

        for cand in candidates {
            if accepted.len() >= self.cfg.max_per_cycle {
                break;
            }
            if !filter::passes_quality(&cand.message, &self.cfg) {
                debug!("Suggestion rejected by quality filter: {}", cand.message);
                continue;
            }
            let hash = filter::normalized_hash(&cand.message);
            if self.dedup.contains(&hash) {
                debug!("Suggestion suppressed as duplicate: {}", cand.message);
                continue;
            }
            self.dedup.insert(hash.clone());
            accepted.push(Suggestion {
                kind: cand.kind,
                message: cand.message.trim().to_string(),
                severity: cand.severity,
                content_hash: hash,
                emitted_at: Utc::now(),
            });
        }

        accepted
    }
}

/// One analysis cycle over a transcript window. Every step that fails is
/// logged and contributes nothing; the cycle itself never errors.
pub async fn analyze(
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchClient>,
    cfg: SuggestConfig,
    context: String,
    entries: Vec<TranscriptEntry>,
) -> Vec<Candidate> {
    let mut candidates = rubric_pass(llm.as_ref(), &context, &entries).await;

    if let Some(fact) = verification_pass(llm.as_ref(), search.as_ref(), &cfg, &entries).await {
        candidates.push(fact);
    }

    candidates
}

/// Step 1: LLM rubric call producing up to 3 structured suggestions.
async fn rubric_pass(
    llm: &dyn LlmClient,
    context: &str,
    entries: &[TranscriptEntry],
) -> Vec<Candidate> {
    let transcript = render_transcript(entries);
    let user = format!(
        "Meeting context:\n{}\n\nRecent transcript:\n{}",
        context, transcript
    );

    let raw = match llm.complete(RUBRIC_PROMPT, &user).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Suggestion LLM call failed: {}", e);
            return Vec::new();
        }
    };

    match parse_candidates(&raw) {
        Some(cands) => cands.into_iter().take(3).collect(),
        None => {
            warn!("Suggestion LLM returned unparseable output");
            Vec::new()
        }
    }
}

/// Step 2: hedge/claim scan over the user's own utterances; on a hit,
/// derive queries, search, and synthesize one verification statement.
async fn verification_pass(
    llm: &dyn LlmClient,
    search: &dyn SearchClient,
    cfg: &SuggestConfig,
    entries: &[TranscriptEntry],
) -> Option<Candidate> {
    let user_speech: Vec<&str> = entries
        .iter()
        .filter(|e| e.is_user)
        .map(|e| e.text.as_str())
        .collect();
    if user_speech.is_empty() {
        return None;
    }

    let joined = user_speech.join("\n");
    if !filter::is_hedged(&joined) && !filter::mentions_claim_domain(&joined) {
        return None;
    }

    let queries = match llm.complete(QUERY_PROMPT, &joined).await {
        Ok(text) => text
            .lines()
            .map(|l| {
                l.trim()
                    .trim_start_matches(|c: char| c == '-' || c == '*' || c == ' ')
                    .to_string()
            })
            .filter(|l| !l.is_empty())
            .take(cfg.max_queries)
            .collect::<Vec<_>>(),
        Err(e) => {
            warn!("Query derivation failed: {}", e);
            return None;
        }
    };
    if queries.is_empty() {
        return None;
    }

    let mut snippets = Vec::new();
    for query in &queries {
        match search.search(query, 3).await {
            Ok(results) => {
                for r in results {
                    snippets.push(format!("{}: {} ({})", r.title, r.snippet, r.url));
                }
            }
            Err(e) => warn!("Web search failed for '{}': {}", query, e),
        }
    }
    if snippets.is_empty() {
        return None;
    }

    let verify_input = format!(
        "Claims:\n{}\n\nSearch results:\n{}",
        joined,
        snippets.join("\n")
    );
    let statement = match llm.complete(VERIFY_PROMPT, &verify_input).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("Verification synthesis failed: {}", e);
            return None;
        }
    };

    if filter::is_low_confidence(&statement)
        || statement.chars().count() < cfg.min_verification_chars
    {
        debug!("Verification statement discarded: {}", statement);
        return None;
    }

    Some(Candidate {
        kind: "fact".to_string(),
        message: statement,
        severity: "info".to_string(),
    })
}

fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.speaker, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull a JSON array out of possibly fence-wrapped LLM output.
fn parse_candidates(raw: &str) -> Option<Vec<Candidate>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_candidate_array() {
        let raw = "```json\n[{\"type\":\"insight\",\"message\":\"x\"}]\n```";
        let cands = parse_candidates(raw).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].kind, "insight");
        assert_eq!(cands[0].severity, "suggestion");
    }

    #[test]
    fn test_rejects_output_without_array() {
        assert!(parse_candidates("no suggestions this time").is_none());
    }
}
