use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single utterance attributed to a speaker. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Resolved display name ("Alice", "Speaker 2", "You")
    pub speaker: String,

    /// Transcribed text
    pub text: String,

    /// Whether the session owner said this
    pub is_user: bool,

    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
}

/// Bounded, time-ordered buffer of recent utterances. Appends evict the
/// oldest entry once capacity is reached.
#[derive(Debug)]
pub struct TranscriptBuffer {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
}

impl TranscriptBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&mut self, entry: TranscriptEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TranscriptEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> TranscriptEntry {
        TranscriptEntry {
            speaker: "Speaker 1".to_string(),
            text: text.to_string(),
            is_user: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_evicts_oldest_at_capacity() {
        let mut buf = TranscriptBuffer::new(3);
        for t in ["a", "b", "c", "d"] {
            buf.append(entry(t));
        }

        assert_eq!(buf.len(), 3);
        let texts: Vec<String> = buf.recent(10).into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_recent_returns_newest_in_order() {
        let mut buf = TranscriptBuffer::new(10);
        for t in ["a", "b", "c", "d"] {
            buf.append(entry(t));
        }

        let texts: Vec<String> = buf.recent(2).into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["c", "d"]);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut buf = TranscriptBuffer::new(0);
        buf.append(entry("a"));
        buf.append(entry("b"));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.recent(1)[0].text, "b");
    }
}
