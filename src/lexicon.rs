//! In-memory synonym lexicon used for instant, offline suggestions.
//!
//! Lookup order: exact key match, then the first key (in insertion order) that
//! is a substring of the input or contains it, then generic filler words until
//! at least [`MIN_RESULTS`] suggestions exist.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::suggestion::{Suggestion, SuggestionKind, SuggestionSet, DEFAULT_MAX_SUGGESTIONS};

/// Built-in lexicon, embedded at compile time.
const BUILTIN_LEXICON: &str = include_str!("../resources/lexicon.json");

/// Generic fillers appended, in this order, when a lookup yields too few results.
pub const FILLER_WORDS: [&str; 5] = ["alternative", "option", "choice", "variant", "substitute"];

const EXACT_LIMIT: usize = 5;
const EXACT_CONFIDENCE: f64 = 0.8;
const PARTIAL_LIMIT: usize = 3;
const PARTIAL_CONFIDENCE: f64 = 0.6;
const FILLER_CONFIDENCE: f64 = 0.4;
pub const MIN_RESULTS: usize = 3;

#[derive(Debug, Deserialize)]
struct RawLexiconEntry {
    word: String,
    #[serde(default, alias = "candidates")]
    synonyms: Vec<String>,
}

/// A normalized key and its replacement words, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    pub key: String,
    pub candidates: Vec<String>,
}

impl LexiconEntry {
    /// Normalize the key and clean the candidate list (trimmed, non-empty,
    /// case-insensitively unique). Returns `None` when the key is empty.
    pub fn new(word: &str, candidates: &[String]) -> Option<Self> {
        let key = normalize_for_match(word);
        if key.is_empty() {
            return None;
        }

        let mut seen = HashSet::new();
        let candidates = candidates
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .filter(|c| seen.insert(c.to_lowercase()))
            .map(str::to_string)
            .collect();

        Some(Self { key, candidates })
    }
}

/// Normalize text for matching: trim, lowercase, drop trailing punctuation.
///
/// The result is only used as a lookup key; displayed text is never altered.
pub fn normalize_for_match(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .trim_end_matches(|c: char| !c.is_alphanumeric() && !c.is_whitespace())
        .trim_end()
        .to_string()
}

/// Read-only after construction; shared across tasks behind an `Arc`.
#[derive(Debug, Clone)]
pub struct LocalLexicon {
    entries: Vec<LexiconEntry>,
    index: HashMap<String, usize>,
    max_suggestions: usize,
}

impl LocalLexicon {
    /// Build a lexicon from entries in insertion order. Duplicate keys are an error.
    pub fn new(entries: Vec<LexiconEntry>) -> Result<Self> {
        let mut lexicon = Self {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        };

        for entry in entries {
            if lexicon.index.contains_key(&entry.key) {
                return Err(anyhow!("Duplicate lexicon key: {}", entry.key));
            }
            lexicon.push(entry);
        }

        Ok(lexicon)
    }

    /// The embedded lexicon shipped with the application.
    pub fn builtin() -> Result<Self> {
        let entries = parse_entries(BUILTIN_LEXICON).context("Failed to parse built-in lexicon")?;
        Self::new(entries)
    }

    /// Load the built-in lexicon, then merge an optional user lexicon file on top.
    pub fn load(user_path: Option<&Path>) -> Result<Self> {
        let mut lexicon = Self::builtin()?;
        if let Some(path) = user_path {
            let entries = load_entries_from_file(path)?;
            info!(
                path = %path.display(),
                entries = entries.len(),
                "Merging user lexicon"
            );
            lexicon.merge(entries);
        }
        Ok(lexicon)
    }

    pub fn with_max_suggestions(mut self, max_suggestions: usize) -> Self {
        self.max_suggestions = max_suggestions;
        self
    }

    /// Append new keys; an existing key has its candidates replaced in place.
    pub fn merge(&mut self, entries: Vec<LexiconEntry>) {
        for entry in entries {
            match self.index.get(&entry.key) {
                Some(&pos) => {
                    debug!(key = %entry.key, "User lexicon overrides built-in entry");
                    self.entries[pos] = entry;
                }
                None => self.push(entry),
            }
        }
    }

    fn push(&mut self, entry: LexiconEntry) {
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_suggestions(&self) -> usize {
        self.max_suggestions
    }

    pub fn get(&self, key: &str) -> Option<&LexiconEntry> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    /// Pure, non-blocking, deterministic lookup.
    pub fn lookup(&self, text: &str) -> SuggestionSet {
        if text.trim().is_empty() {
            return SuggestionSet::empty(self.max_suggestions);
        }

        let key = normalize_for_match(text);
        let mut candidates = Vec::new();

        // A key of pure punctuation ("!!!") would be a substring of every entry.
        if !key.is_empty() {
            if let Some(entry) = self.get(&key) {
                candidates = tag(entry, EXACT_LIMIT, SuggestionKind::Synonym, EXACT_CONFIDENCE);
            } else if let Some(entry) = self.first_partial_match(&key) {
                debug!(input = %key, matched = %entry.key, "Partial lexicon match");
                candidates = tag(entry, PARTIAL_LIMIT, SuggestionKind::Related, PARTIAL_CONFIDENCE);
            }
        }

        pad_with_fillers(&mut candidates);
        SuggestionSet::from_candidates(candidates, self.max_suggestions)
    }

    /// First-hit scan in insertion order; no best-match search.
    fn first_partial_match(&self, key: &str) -> Option<&LexiconEntry> {
        self.entries
            .iter()
            .find(|entry| key.contains(entry.key.as_str()) || entry.key.contains(key))
    }
}

fn tag(
    entry: &LexiconEntry,
    limit: usize,
    kind: SuggestionKind,
    confidence: f64,
) -> Vec<Suggestion> {
    entry
        .candidates
        .iter()
        .take(limit)
        .filter_map(|word| Suggestion::new(word, kind, confidence))
        .collect()
}

fn pad_with_fillers(candidates: &mut Vec<Suggestion>) {
    let mut seen: HashSet<String> = candidates.iter().map(Suggestion::normalized_word).collect();
    for filler in FILLER_WORDS {
        if seen.len() >= MIN_RESULTS {
            break;
        }
        if !seen.insert(filler.to_string()) {
            continue;
        }
        if let Some(s) = Suggestion::new(filler, SuggestionKind::Alternative, FILLER_CONFIDENCE) {
            candidates.push(s);
        }
    }
}

/// Parse a JSON array of `{ "word": ..., "synonyms": [...] }` entries.
///
/// Entries whose key normalizes to nothing are skipped with a warning.
pub fn parse_entries(json: &str) -> Result<Vec<LexiconEntry>> {
    let raw: Vec<RawLexiconEntry> = serde_json::from_str(json)?;
    let entries = raw
        .into_iter()
        .filter_map(|r| {
            let entry = LexiconEntry::new(&r.word, &r.synonyms);
            if entry.is_none() {
                warn!(word = %r.word, "Skipping lexicon entry with empty key");
            }
            entry
        })
        .collect();
    Ok(entries)
}

pub fn load_entries_from_file(path: &Path) -> Result<Vec<LexiconEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lexicon file {}", path.display()))?;
    parse_entries(&content)
        .with_context(|| format!("Failed to parse lexicon file {}", path.display()))
}
