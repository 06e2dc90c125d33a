//! Stemming tokenizer producing term-frequency tables
//!
//! Text is lowercased and split into words, stop words are removed, and each
//! remaining word is reduced to its English (Porter2) Snowball stem. Stems that
//! are purely numeric or a single character are discarded.

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Letters and digits, with apostrophes and hyphens allowed between them
static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*").unwrap_or_else(|e| {
        panic!("word pattern is a valid regex: {}", e)
    })
});

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
        "are", "aren't", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "can't", "cannot", "could", "couldn't", "did",
        "didn't", "do", "does", "doesn't", "doing", "don't", "down", "during", "each", "few",
        "for", "from", "further", "had", "hadn't", "has", "hasn't", "have", "haven't", "having",
        "he", "he'd", "he'll", "he's", "her", "here", "here's", "hers", "herself", "him",
        "himself", "his", "how", "how's", "i", "i'd", "i'll", "i'm", "i've", "if", "in", "into",
        "is", "isn't", "it", "it's", "its", "itself", "let's", "me", "more", "most", "mustn't",
        "my", "myself", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other",
        "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "shan't", "she",
        "she'd", "she'll", "she's", "should", "shouldn't", "so", "some", "such", "than", "that",
        "that's", "the", "their", "theirs", "them", "themselves", "then", "there", "there's",
        "these", "they", "they'd", "they'll", "they're", "they've", "this", "those", "through",
        "to", "too", "under", "until", "up", "very", "was", "wasn't", "we", "we'd", "we'll",
        "we're", "we've", "were", "weren't", "what", "what's", "when", "when's", "where",
        "where's", "which", "while", "who", "who's", "whom", "why", "why's", "will", "with",
        "won't", "would", "wouldn't", "you", "you'd", "you'll", "you're", "you've", "your",
        "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Term-frequency table with index-aligned keys and values
///
/// `keys()[i]` occurs `values()[i]` times. Keys are unique, ordered by
/// frequency descending then term ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermTable {
    keys: Vec<String>,
    values: Vec<u32>,
}

impl TermTable {
    /// Builds a table from (term, frequency) pairs, keeping their order
    pub fn from_pairs(pairs: Vec<(String, u32)>) -> Self {
        let (keys, values) = pairs.into_iter().unzip();
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn frequency(&self, term: &str) -> Option<u32> {
        self.keys
            .iter()
            .position(|k| k == term)
            .map(|i| self.values[i])
    }

    pub fn contains(&self, term: &str) -> bool {
        self.keys.iter().any(|k| k == term)
    }

    /// Highest raw frequency in the table, 0 when empty
    pub fn max_frequency(&self) -> u32 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Text to stemmed term-frequency table
pub struct Tokenizer {
    stemmer: Stemmer,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Tokenizes `text` into a term table
    ///
    /// Equal stems from different surface forms are merged into one entry.
    pub fn tokenize(&self, text: &str) -> TermTable {
        let lowered = text.to_lowercase();
        let mut counts: HashMap<String, u32> = HashMap::new();

        for word in WORD.find_iter(&lowered).map(|m| m.as_str()) {
            if STOP_WORDS.contains(word) {
                continue;
            }

            let stem = self.stemmer.stem(word);
            if is_rejected(&stem) {
                continue;
            }

            *counts.entry(stem.into_owned()).or_insert(0) += 1;
        }

        let mut pairs: Vec<(String, u32)> = counts.into_iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        TermTable::from_pairs(pairs)
    }
}

/// Purely numeric or single-character stems carry no meaning
fn is_rejected(stem: &str) -> bool {
    if stem.chars().count() < 2 {
        return true;
    }

    stem.chars()
        .filter(|c| c.is_alphanumeric())
        .all(|c| c.is_numeric())
}
