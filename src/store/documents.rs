//! SQLite document store
//!
//! This module provides the SQLite-based implementation of the `DocumentStore` trait.

use crate::store::schema::initialize_documents_schema;
use crate::store::traits::{DocumentStore, StorageError, StorageResult};
use crate::store::{
    Article, DocumentId, ScrapedDocument, StoredDocument, TermWeight, TfIdfVector,
};
use crate::text::TermTable;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DOCUMENT_COLUMNS: &str = "id, url, source, article_url, title, body, author, published, \
     description, image, site_name, tokenized, indexed, created_at";

/// SQLite primary store backend
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

/// A document row before its term table and weights are attached
struct DocumentRow {
    doc: StoredDocument,
    tokenized: bool,
    indexed: bool,
}

impl SqliteDocumentStore {
    /// Opens (or creates) the document database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for concurrent readers alongside one writer
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_documents_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_documents_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("document store lock poisoned".to_string()))
    }
}

fn map_document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        doc: StoredDocument {
            id: row.get(0)?,
            url: row.get(1)?,
            source: row.get(2)?,
            article: Article {
                url: row.get(3)?,
                title: row.get(4)?,
                text: row.get(5)?,
                author: row.get(6)?,
                published: row.get(7)?,
                description: row.get(8)?,
                image: row.get(9)?,
                site_name: row.get(10)?,
                links: Vec::new(),
            },
            created_at: row.get(13)?,
            terms: None,
            tfidf: None,
        },
        tokenized: row.get::<_, i64>(11)? != 0,
        indexed: row.get::<_, i64>(12)? != 0,
    })
}

/// Attaches links, term table and TF-IDF vector to a document row
fn hydrate(conn: &Connection, row: DocumentRow) -> StorageResult<StoredDocument> {
    let DocumentRow {
        mut doc,
        tokenized,
        indexed,
    } = row;

    let mut stmt = conn
        .prepare("SELECT url FROM document_links WHERE document_id = ?1 ORDER BY position")?;
    doc.article.links = stmt
        .query_map(params![doc.id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    if tokenized {
        let mut stmt = conn.prepare(
            "SELECT term, frequency FROM document_terms WHERE document_id = ?1 ORDER BY position",
        )?;
        let pairs = stmt
            .query_map(params![doc.id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, u32)>, _>>()?;
        doc.terms = Some(TermTable::from_pairs(pairs));
    }

    if indexed {
        let mut stmt = conn.prepare(
            "SELECT term, tf, idf FROM document_tfidf WHERE document_id = ?1 ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![doc.id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    TermWeight {
                        tf: row.get(1)?,
                        idf: row.get(2)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        doc.tfidf = Some(TfIdfVector { entries });
    }

    Ok(doc)
}

/// Runs a document query and hydrates every row
fn load_documents(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<StoredDocument>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_document_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

impl DocumentStore for SqliteDocumentStore {
    // ===== Documents =====

    fn insert_document(&self, doc: &ScrapedDocument) -> StorageResult<DocumentId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let article = &doc.article;

        let inserted = tx.execute(
            "INSERT INTO documents (url, source, raw_html, article_url, title, body, author,
             published, description, image, site_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                doc.url,
                doc.source,
                doc.raw_html,
                article.url,
                article.title,
                article.text,
                article.author,
                article.published,
                article.description,
                article.image,
                article.site_name,
                now
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StorageError::DuplicateUrl(doc.url.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        for (position, link) in article.links.iter().enumerate() {
            tx.execute(
                "INSERT INTO document_links (document_id, position, url) VALUES (?1, ?2, ?3)",
                params![id, position as i64, link],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    fn get_document(&self, id: DocumentId) -> StorageResult<Option<StoredDocument>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS);
        let row = conn
            .query_row(&sql, params![id], map_document_row)
            .optional()?;

        row.map(|row| hydrate(&conn, row)).transpose()
    }

    fn find_by_url(&self, url: &str) -> StorageResult<Option<StoredDocument>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM documents WHERE url = ?1", DOCUMENT_COLUMNS);
        let row = conn
            .query_row(&sql, params![url], map_document_row)
            .optional()?;

        row.map(|row| hydrate(&conn, row)).transpose()
    }

    fn find_by_source(&self, source: &str) -> StorageResult<Vec<StoredDocument>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM documents WHERE source = ?1 ORDER BY id",
            DOCUMENT_COLUMNS
        );
        load_documents(&conn, &sql, params![source])
    }

    fn find_missing_tfidf(&self) -> StorageResult<Vec<DocumentId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM documents WHERE indexed = 0 ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn document_urls(
        &self,
        after: DocumentId,
        limit: usize,
    ) -> StorageResult<Vec<(DocumentId, String)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, url FROM documents WHERE id > ?1 ORDER BY id LIMIT ?2")?;
        let urls = stmt
            .query_map(params![after, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    fn find_indexed_by_terms(&self, terms: &[String]) -> StorageResult<Vec<StoredDocument>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; terms.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM documents WHERE indexed = 1 AND id IN
             (SELECT document_id FROM document_terms WHERE term IN ({}))
             ORDER BY id",
            DOCUMENT_COLUMNS, placeholders
        );
        load_documents(&conn, &sql, params_from_iter(terms.iter()))
    }

    // ===== Terms and weights =====

    fn set_terms(&self, id: DocumentId, terms: &TermTable) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let claimed = tx.execute(
            "UPDATE documents SET tokenized = 1, updated_at = ?1 WHERE id = ?2 AND tokenized = 0",
            params![now, id],
        )?;

        if claimed == 0 {
            let exists: Option<i64> = tx
                .query_row("SELECT id FROM documents WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            return match exists {
                Some(_) => Ok(false),
                None => Err(StorageError::DocumentNotFound(id)),
            };
        }

        for (position, (term, frequency)) in terms.iter().enumerate() {
            tx.execute(
                "INSERT INTO document_terms (document_id, position, term, frequency)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, position as i64, term, frequency],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn set_tfidf(&self, id: DocumentId, vector: &TfIdfVector) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let updated = tx.execute(
            "UPDATE documents SET indexed = 1, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        if updated == 0 {
            return Err(StorageError::DocumentNotFound(id));
        }

        tx.execute(
            "DELETE FROM document_tfidf WHERE document_id = ?1",
            params![id],
        )?;
        for (position, (term, weight)) in vector.entries.iter().enumerate() {
            tx.execute(
                "INSERT INTO document_tfidf (document_id, position, term, tf, idf)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, position as i64, term, weight.tf, weight.idf],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn update_term_idf(&self, term: &str, idf: f64) -> StorageResult<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE document_tfidf SET idf = ?1 WHERE term = ?2",
            params![idf, term],
        )?;
        Ok(updated)
    }

    // ===== Statistics =====

    fn count_documents(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_documents_with_term(&self, term: &str) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT document_id) FROM document_terms WHERE term = ?1",
            params![term],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Corpus profile =====

    fn replace_corpus_profile(&self, profile: &[(String, f64)]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM corpus_profile", [])?;
        for (term, frequency) in profile {
            tx.execute(
                "INSERT OR REPLACE INTO corpus_profile (term, frequency) VALUES (?1, ?2)",
                params![term, frequency],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn corpus_profile(&self) -> StorageResult<Vec<(String, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT term, frequency FROM corpus_profile ORDER BY term")?;
        let profile = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profile)
    }
}
