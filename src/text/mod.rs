//! Text analysis shared by indexing and search
//!
//! Documents and queries go through the same [`Tokenizer`] so that their
//! stemmed vocabularies are comparable.

mod tokenizer;

pub use tokenizer::{TermTable, Tokenizer};
