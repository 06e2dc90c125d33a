//! Tokenization and TF-IDF indexing
//!
//! Indexing a document computes `tf = frequency / max frequency` and
//! `idf = log2(total documents / documents containing the term)` for each of
//! its terms. Every indexed term is also staged for the corpus-wide idf roll
//! (see [`IdfRoller`]), which later broadcasts the freshest idf value to all
//! stored vectors containing that term.

mod roller;

pub use roller::{IdfRoller, RollOutcome};

use crate::store::{CacheOp, CacheStore, DocumentId, DocumentStore, TermWeight, TfIdfVector};
use crate::text::{TermTable, Tokenizer};
use crate::{Result, RippleError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache list of terms waiting for an idf roll
pub const IDF_QUEUE_KEY: &str = "idfQueue";

/// Cache hash of staged idf values, one field per term
pub const IDF_STAGING_KEY: &str = "idfTemp";

/// Cache lock held while a roll cycle runs
pub const IDF_ROLL_LOCK: &str = "idfRoll";

/// Inverse document frequency in bits
///
/// Terms seen in no document count as seen in one; an empty corpus yields 0.
pub fn compute_idf(total_documents: u64, documents_with_term: u64) -> f64 {
    if total_documents == 0 {
        return 0.0;
    }
    let ratio = total_documents as f64 / documents_with_term.max(1) as f64;
    ratio.ln() / std::f64::consts::LN_2
}

pub struct Indexer {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheStore>,
    tokenizer: Tokenizer,
}

impl Indexer {
    pub fn new(documents: Arc<dyn DocumentStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            documents,
            cache,
            tokenizer: Tokenizer::new(),
        }
    }

    /// Tokenizes a document's article text and stores its term table
    ///
    /// Documents are tokenized once; an existing table is returned as is.
    pub fn tokenize_document(&self, id: DocumentId) -> Result<TermTable> {
        let doc = self
            .documents
            .get_document(id)?
            .ok_or(RippleError::DocumentNotFound(id))?;

        if let Some(terms) = doc.terms {
            debug!("Document {} already tokenized", id);
            return Ok(terms);
        }

        let table = self.tokenizer.tokenize(&doc.article.text);
        if self.documents.set_terms(id, &table)? {
            debug!("Tokenized document {} into {} terms", id, table.len());
            return Ok(table);
        }

        // Another worker stored its table first
        Ok(self
            .documents
            .get_document(id)?
            .and_then(|doc| doc.terms)
            .unwrap_or(table))
    }

    /// Computes, stores and stages the TF-IDF vector of a document
    ///
    /// Tokenizes the document first if needed. Each term's idf is computed
    /// against the collection as it is now; the value is also staged in the
    /// cache and the term queued so the roller can refresh older vectors.
    ///
    /// # Arguments
    ///
    /// * `id` - Primary store id of the document
    ///
    /// # Returns
    ///
    /// * `Ok(TfIdfVector)` - The stored vector, ordered like the term table
    /// * `Err(RippleError::DocumentNotFound)` - No document has this id
    /// * `Err(RippleError::Storage)` - A store read or write failed
    pub fn index_document(&self, id: DocumentId) -> Result<TfIdfVector> {
        let terms = self.tokenize_document(id)?;
        let total = self.documents.count_documents()?;
        let max_frequency = terms.max_frequency().max(1) as f64;

        let mut entries = Vec::with_capacity(terms.len());
        for (term, frequency) in terms.iter() {
            let with_term = self.documents.count_documents_with_term(term)?;
            entries.push((
                term.to_string(),
                TermWeight {
                    tf: frequency as f64 / max_frequency,
                    idf: compute_idf(total, with_term),
                },
            ));
        }

        let vector = TfIdfVector { entries };
        self.documents.set_tfidf(id, &vector)?;

        let mut ops = Vec::with_capacity(vector.len() * 2);
        for (term, weight) in &vector.entries {
            ops.push(CacheOp::HSet {
                key: IDF_STAGING_KEY.to_string(),
                field: term.clone(),
                value: weight.idf.to_string(),
            });
            ops.push(CacheOp::LPush {
                key: IDF_QUEUE_KEY.to_string(),
                value: term.clone(),
            });
        }
        self.cache.pipeline(&ops)?;

        info!("Indexed document {} ({} terms)", id, vector.len());
        Ok(vector)
    }

    /// Runs one roll step
    ///
    /// Performs no store writes while `index_active` is non-zero. A term
    /// popped while another roller holds the lock is abandoned.
    pub fn roll_once(&self, index_active: usize, lock_ttl: Duration) -> Result<RollOutcome> {
        if index_active > 0 {
            return Ok(RollOutcome::Busy);
        }

        let Some(term) = self.cache.rpop(IDF_QUEUE_KEY)? else {
            return Ok(RollOutcome::Idle);
        };

        if !self.cache.try_lock(IDF_ROLL_LOCK, lock_ttl)? {
            return Ok(RollOutcome::Contended(term));
        }

        let rolled = self.broadcast_staged_idf(&term);
        let released = self.cache.release_lock(IDF_ROLL_LOCK);
        let updated = rolled?;
        released?;

        Ok(match updated {
            Some(updated) => RollOutcome::Rolled { term, updated },
            None => RollOutcome::NothingStaged(term),
        })
    }

    /// Takes the staged idf for `term` and writes it to every stored vector
    fn broadcast_staged_idf(&self, term: &str) -> Result<Option<usize>> {
        let Some(raw) = self.cache.htake(IDF_STAGING_KEY, term)? else {
            return Ok(None);
        };

        let idf = match raw.parse::<f64>() {
            Ok(idf) => idf,
            Err(_) => {
                warn!("Discarding unreadable staged idf '{}' for {}", raw, term);
                return Ok(None);
            }
        };

        let updated = self.documents.update_term_idf(term, idf)?;
        debug!("Rolled idf {} for '{}' into {} vectors", idf, term, updated);
        Ok(Some(updated))
    }

    /// Rebuilds the corpus profile from one source's documents
    ///
    /// For each term, averages its normalized frequency (frequency over the
    /// document's maximum) across the documents containing it. Returns the
    /// number of profiled terms.
    pub fn rebuild_corpus_profile(&self, source: &str) -> Result<usize> {
        let docs = self.documents.find_by_source(source)?;
        let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();

        for doc in &docs {
            let terms = match &doc.terms {
                Some(terms) => terms.clone(),
                None => self.tokenizer.tokenize(&doc.article.text),
            };
            let max_frequency = terms.max_frequency();
            if max_frequency == 0 {
                continue;
            }

            for (term, frequency) in terms.iter() {
                let entry = totals.entry(term.to_string()).or_insert((0.0, 0));
                entry.0 += frequency as f64 / max_frequency as f64;
                entry.1 += 1;
            }
        }

        let profile: Vec<(String, f64)> = totals
            .into_iter()
            .map(|(term, (sum, count))| (term, sum / count as f64))
            .collect();

        self.documents.replace_corpus_profile(&profile)?;
        info!(
            "Rebuilt corpus profile from {} {} documents ({} terms)",
            docs.len(),
            source,
            profile.len()
        );
        Ok(profile.len())
    }
}
