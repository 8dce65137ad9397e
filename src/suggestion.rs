//! Suggestion data model shared by the lexicon, the remote provider and the engine.
//!
//! A [`SuggestionSet`] is always deduplicated by normalized word, ordered by
//! descending confidence (ties broken by kind priority, then first-seen order)
//! and capped at its maximum size. Every constructor goes through
//! [`SuggestionSet::from_candidates`], so a set can never violate those rules.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Default cap on the number of suggestions presented for one selection.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Synonym,
    Alternative,
    Related,
    Creative,
}

impl SuggestionKind {
    /// Lower ranks first when confidences tie.
    fn priority(self) -> u8 {
        match self {
            SuggestionKind::Synonym => 0,
            SuggestionKind::Alternative => 1,
            SuggestionKind::Related => 2,
            SuggestionKind::Creative => 3,
        }
    }

    /// Parse a provider-supplied kind label, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "synonym" => Some(SuggestionKind::Synonym),
            "alternative" => Some(SuggestionKind::Alternative),
            "related" => Some(SuggestionKind::Related),
            "creative" => Some(SuggestionKind::Creative),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionKind::Synonym => "synonym",
            SuggestionKind::Alternative => "alternative",
            SuggestionKind::Related => "related",
            SuggestionKind::Creative => "creative",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One replacement candidate. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    word: String,
    kind: SuggestionKind,
    confidence: f64,
}

impl Suggestion {
    /// Build a suggestion, trimming the word and clamping confidence to `[0, 1]`.
    ///
    /// Returns `None` for an empty word or a non-finite confidence.
    pub fn new(word: &str, kind: SuggestionKind, confidence: f64) -> Option<Self> {
        let word = word.trim();
        if word.is_empty() || !confidence.is_finite() {
            return None;
        }
        Some(Self {
            word: word.to_string(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn kind(&self) -> SuggestionKind {
        self.kind
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Key used for case-insensitive deduplication.
    pub fn normalized_word(&self) -> String {
        self.word.to_lowercase()
    }

    fn rank_cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| self.kind.priority().cmp(&other.kind.priority()))
    }
}

/// Ordered, deduplicated, capped output of one suggestion computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionSet {
    items: Vec<Suggestion>,
    #[serde(skip)]
    max_size: usize,
}

impl Default for SuggestionSet {
    fn default() -> Self {
        Self::empty(DEFAULT_MAX_SUGGESTIONS)
    }
}

impl SuggestionSet {
    pub fn empty(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            max_size,
        }
    }

    /// Rank, deduplicate and cap raw candidates.
    ///
    /// The sort is stable, so candidates that tie on confidence and kind keep
    /// their first-seen order. When a word repeats, the best-ranked copy wins.
    pub fn from_candidates<I>(candidates: I, max_size: usize) -> Self
    where
        I: IntoIterator<Item = Suggestion>,
    {
        let mut ranked: Vec<Suggestion> = candidates.into_iter().collect();
        ranked.sort_by(Suggestion::rank_cmp);

        let mut seen = HashSet::new();
        let items = ranked
            .into_iter()
            .filter(|s| seen.insert(s.normalized_word()))
            .take(max_size)
            .collect();

        Self { items, max_size }
    }

    /// Re-apply the ordering, dedupe and cap rules, optionally under a new cap.
    pub fn revalidate(self, max_size: usize) -> Self {
        Self::from_candidates(self.items, max_size)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Suggestion> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Suggestion] {
        &self.items
    }

    pub fn contains_word(&self, word: &str) -> bool {
        let key = word.trim().to_lowercase();
        self.items.iter().any(|s| s.normalized_word() == key)
    }

    pub fn words(&self) -> Vec<&str> {
        self.items.iter().map(Suggestion::word).collect()
    }
}

impl<'a> IntoIterator for &'a SuggestionSet {
    type Item = &'a Suggestion;
    type IntoIter = std::slice::Iter<'a, Suggestion>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Screen coordinate of the selection, used to anchor the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One user-triggered request for suggestions.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub text: String,
    pub origin: Point,
    pub request_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(word: &str, kind: SuggestionKind, confidence: f64) -> Suggestion {
        Suggestion::new(word, kind, confidence).unwrap()
    }

    #[test]
    fn suggestion_trims_word_and_clamps_confidence() {
        let high = s("  swift ", SuggestionKind::Synonym, 1.7);
        assert_eq!(high.word(), "swift");
        assert_eq!(high.confidence(), 1.0);

        let low = s("slow", SuggestionKind::Related, -0.2);
        assert_eq!(low.confidence(), 0.0);
    }

    #[test]
    fn suggestion_rejects_empty_word_and_nan() {
        assert!(Suggestion::new("   ", SuggestionKind::Synonym, 0.5).is_none());
        assert!(Suggestion::new("word", SuggestionKind::Synonym, f64::NAN).is_none());
    }

    #[test]
    fn set_orders_by_confidence_then_kind_then_first_seen() {
        let set = SuggestionSet::from_candidates(
            vec![
                s("spark", SuggestionKind::Creative, 0.7),
                s("quick", SuggestionKind::Related, 0.7),
                s("rapid", SuggestionKind::Synonym, 0.7),
                s("fleet", SuggestionKind::Synonym, 0.7),
                s("swift", SuggestionKind::Alternative, 0.9),
            ],
            10,
        );
        assert_eq!(set.words(), vec!["swift", "rapid", "fleet", "quick", "spark"]);
    }

    #[test]
    fn set_dedupes_case_insensitively_keeping_best_ranked() {
        let set = SuggestionSet::from_candidates(
            vec![
                s("Great", SuggestionKind::Alternative, 0.4),
                s("great", SuggestionKind::Synonym, 0.9),
                s("GREAT", SuggestionKind::Related, 0.6),
            ],
            5,
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].kind(), SuggestionKind::Synonym);
        assert_eq!(set.as_slice()[0].word(), "great");
    }

    #[test]
    fn set_is_capped() {
        let words = ["a", "b", "c", "d", "e", "f", "g"];
        let set = SuggestionSet::from_candidates(
            words
                .iter()
                .map(|w| s(w, SuggestionKind::Synonym, 0.8)),
            DEFAULT_MAX_SUGGESTIONS,
        );
        assert_eq!(set.len(), 5);
        assert_eq!(set.words(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn revalidate_applies_new_cap() {
        let set = SuggestionSet::from_candidates(
            vec![
                s("one", SuggestionKind::Synonym, 0.5),
                s("two", SuggestionKind::Synonym, 0.9),
                s("three", SuggestionKind::Synonym, 0.7),
            ],
            5,
        );
        let capped = set.revalidate(2);
        assert_eq!(capped.words(), vec!["two", "three"]);
        assert_eq!(capped.max_size(), 2);
    }

    #[test]
    fn kind_parse_is_case_insensitive() {
        assert_eq!(SuggestionKind::parse(" Synonym "), Some(SuggestionKind::Synonym));
        assert_eq!(SuggestionKind::parse("CREATIVE"), Some(SuggestionKind::Creative));
        assert_eq!(SuggestionKind::parse("antonym"), None);
    }
}
