//! Relevance-ranked search over indexed documents
//!
//! A query is tokenized like a document and weighted with the current corpus
//! idf. Each candidate sharing at least one term is scored as
//!
//! ```text
//! score = Σ (d.tf · d.idf) · q.tfidf / sqrt(Σ (d.tf · d.idf)² + Σ q.tf²)
//! ```
//!
//! where both sums over `d` run over the terms shared with the query, and
//! `Σ q.tf²` runs over every query term.

use crate::indexer::compute_idf;
use crate::store::{DocumentStore, StoredDocument};
use crate::text::Tokenizer;
use crate::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A ranked search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub score: f64,
    /// Name of the source the document was scraped from
    pub source: String,
    pub title: Option<String>,
    pub text: String,
    pub author: Option<String>,
    pub published: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
}

impl SearchResult {
    fn from_document(doc: StoredDocument, score: f64) -> Self {
        let article = doc.article;
        Self {
            url: doc.url,
            score,
            source: doc.source,
            title: article.title,
            text: article.text,
            author: article.author,
            published: article.published,
            description: article.description,
            image: article.image,
            site_name: article.site_name,
        }
    }
}

/// Query-side weights of one term
#[derive(Debug, Clone, Copy)]
struct QueryWeight {
    tf: f64,
    tfidf: f64,
}

pub struct SearchEngine {
    documents: Arc<dyn DocumentStore>,
    tokenizer: Tokenizer,
}

impl SearchEngine {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            tokenizer: Tokenizer::new(),
        }
    }

    /// Number of documents in the corpus
    pub fn num_docs(&self) -> Result<u64> {
        Ok(self.documents.count_documents()?)
    }

    /// Ranks indexed documents against `query`, best first
    ///
    /// Only documents with a TF-IDF vector sharing at least one query term
    /// are scored. Duplicate articles collapse to the most recent copy, and
    /// equal scores keep store order.
    ///
    /// # Arguments
    ///
    /// * `query` - Free text, tokenized like article text
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<SearchResult>)` - Matches by descending score; empty when no term matches
    /// * `Err(RippleError::Storage)` - The primary store could not be read
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let terms = self.tokenizer.tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let total = self.documents.count_documents()?;
        let max_frequency = terms.max_frequency() as f64;

        let mut weights = HashMap::with_capacity(terms.len());
        let mut query_length = 0.0;
        for (term, frequency) in terms.iter() {
            let tf = frequency as f64 / max_frequency;
            let with_term = self.documents.count_documents_with_term(term)?;
            let idf = if with_term == 0 {
                0.0
            } else {
                compute_idf(total, with_term)
            };

            query_length += tf * tf;
            weights.insert(term.to_string(), QueryWeight { tf, tfidf: tf * idf });
        }

        let candidates = self.documents.find_indexed_by_terms(terms.keys())?;
        let candidate_count = candidates.len();

        // One representative per URL: the highest id wins
        let mut by_url: HashMap<String, StoredDocument> = HashMap::new();
        for doc in candidates {
            match by_url.get(doc.dedup_url()) {
                Some(existing) if existing.id >= doc.id => {}
                _ => {
                    by_url.insert(doc.dedup_url().to_string(), doc);
                }
            }
        }
        let mut unique: Vec<StoredDocument> = by_url.into_values().collect();
        unique.sort_by_key(|doc| doc.id);

        let mut results: Vec<SearchResult> = unique
            .into_iter()
            .map(|doc| {
                let score = score_document(&doc, &weights, query_length);
                SearchResult::from_document(doc, score)
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        debug!(
            "Query '{}': {} candidates, {} results",
            query,
            candidate_count,
            results.len()
        );
        Ok(results)
    }
}

fn score_document(
    doc: &StoredDocument,
    weights: &HashMap<String, QueryWeight>,
    query_length: f64,
) -> f64 {
    let Some(vector) = &doc.tfidf else {
        return 0.0;
    };

    let mut similarity = 0.0;
    let mut doc_length = 0.0;
    for (term, weight) in &vector.entries {
        if let Some(query) = weights.get(term) {
            let d = weight.tf * weight.idf;
            similarity += d * query.tfidf;
            doc_length += d * d;
        }
    }

    let norm = (doc_length + query_length).sqrt();
    if norm == 0.0 {
        0.0
    } else {
        similarity / norm
    }
}
