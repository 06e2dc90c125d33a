//! Database schema definitions
//!
//! This module contains the SQL schemas for the document database and the
//! cache database.

/// SQL schema for the primary document store
pub const DOCUMENTS_SCHEMA_SQL: &str = r#"
-- Scraped articles
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    raw_html TEXT NOT NULL,
    article_url TEXT,
    title TEXT,
    body TEXT NOT NULL,
    author TEXT,
    published TEXT,
    description TEXT,
    image TEXT,
    site_name TEXT,
    tokenized INTEGER NOT NULL DEFAULT 0,
    indexed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source);
CREATE INDEX IF NOT EXISTS idx_documents_indexed ON documents(indexed);

-- Links found in the article body
CREATE TABLE IF NOT EXISTS document_links (
    document_id INTEGER NOT NULL REFERENCES documents(id),
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (document_id, position)
);

-- Term table: position keeps keys and values aligned
CREATE TABLE IF NOT EXISTS document_terms (
    document_id INTEGER NOT NULL REFERENCES documents(id),
    position INTEGER NOT NULL,
    term TEXT NOT NULL,
    frequency INTEGER NOT NULL,
    PRIMARY KEY (document_id, position)
);

CREATE INDEX IF NOT EXISTS idx_document_terms_term ON document_terms(term);

-- TF-IDF vectors; tfidf is derived as tf * idf on read
CREATE TABLE IF NOT EXISTS document_tfidf (
    document_id INTEGER NOT NULL REFERENCES documents(id),
    position INTEGER NOT NULL,
    term TEXT NOT NULL,
    tf REAL NOT NULL,
    idf REAL NOT NULL,
    PRIMARY KEY (document_id, term)
);

CREATE INDEX IF NOT EXISTS idx_document_tfidf_term ON document_tfidf(term);

-- Average normalized term frequency over one source's documents
CREATE TABLE IF NOT EXISTS corpus_profile (
    term TEXT PRIMARY KEY,
    frequency REAL NOT NULL
);
"#;

/// SQL schema for the cache store
pub const CACHE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS hash_fields (
    key TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (key, field)
);

CREATE TABLE IF NOT EXISTS list_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_list_items_key ON list_items(key, id);

CREATE TABLE IF NOT EXISTS locks (
    name TEXT PRIMARY KEY,
    expires_at INTEGER NOT NULL
);
"#;

/// Initializes the document store schema
pub fn initialize_documents_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(DOCUMENTS_SCHEMA_SQL)?;
    Ok(())
}

/// Initializes the cache store schema
pub fn initialize_cache_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CACHE_SCHEMA_SQL)?;
    Ok(())
}
