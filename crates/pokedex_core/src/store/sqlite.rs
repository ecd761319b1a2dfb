//! Embedded document store persisted in SQLite.
//!
//! # Responsibility
//! - Persist JSON documents grouped by logical database and collection.
//! - Evaluate the crate's filter/update documents in-process.
//!
//! # Invariants
//! - The file schema is tracked via `PRAGMA user_version`; newer files are
//!   refused.
//! - A logical database exists iff it owns at least one collection.
//! - Inserting into a missing collection creates it.
//! - Natural order (`seq`) decides which document is the "first" match.
//! - Every read-modify-write runs in one SQLite transaction.

use super::query::{self, MatchOutcome};
use super::{Document, DocumentId, DocumentStore, Namespace, StoreError, StoreResult, ID_FIELD};
use log::{error, info};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Schema version written by this binary.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = include_str!("sqlite_schema.sql");

const DOCUMENT_SCAN_SQL: &str = "SELECT seq, body
FROM documents
WHERE database = ?1 AND collection = ?2
ORDER BY seq ASC;";

/// SQLite-backed `DocumentStore`.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Opens (or creates) a store file.
    ///
    /// # Side effects
    /// - Emits `store_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        open_with("file", || Connection::open(path))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        open_with("memory", Connection::open_in_memory)
    }

    /// Reclaims a poisoned lock; an unwound `Transaction` has already rolled back.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_with(
    mode: &'static str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> StoreResult<SqliteDocumentStore> {
    let started_at = Instant::now();
    let opened = open()
        .map_err(StoreError::from)
        .and_then(|mut conn| prepare_schema(&mut conn).map(|()| conn));

    match opened {
        Ok(conn) => {
            info!(
                "event=store_open module=store backend=sqlite status=ok mode={} schema_version={} duration_ms={}",
                mode,
                SCHEMA_VERSION,
                started_at.elapsed().as_millis()
            );
            Ok(SqliteDocumentStore {
                conn: Mutex::new(conn),
            })
        }
        Err(err) => {
            error!(
                "event=store_open module=store backend=sqlite status=error mode={} duration_ms={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Enables cascading collection drops and creates the tables on a fresh file.
fn prepare_schema(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_SQL)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

impl DocumentStore for SqliteDocumentStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT name FROM collections WHERE database = ?1 ORDER BY name ASC;")?;
        let names = stmt
            .query_map([database], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn create_collection(&self, ns: Namespace<'_>) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO collections (database, name) VALUES (?1, ?2);",
            params![ns.database, ns.collection],
        )?;
        Ok(())
    }

    fn drop_collection(&self, ns: Namespace<'_>) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM collections WHERE database = ?1 AND name = ?2;",
            params![ns.database, ns.collection],
        )?;
        Ok(())
    }

    fn drop_database(&self, database: &str) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM collections WHERE database = ?1;", [database])?;
        Ok(())
    }

    fn insert_one(&self, ns: Namespace<'_>, document: Document) -> StoreResult<DocumentId> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        ensure_collection(&tx, ns)?;
        let id = insert_document(&tx, ns, document)?;
        tx.commit()?;
        Ok(id)
    }

    fn insert_many(
        &self,
        ns: Namespace<'_>,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        ensure_collection(&tx, ns)?;
        let ids = documents
            .into_iter()
            .map(|document| insert_document(&tx, ns, document))
            .collect::<StoreResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    fn find(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        limit: Option<u64>,
    ) -> StoreResult<Vec<Document>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(DOCUMENT_SCAN_SQL)?;
        let mut rows = stmt.query(params![ns.database, ns.collection])?;
        let mut found = Vec::new();

        while let Some(row) = rows.next()? {
            if limit.is_some_and(|limit| found.len() as u64 >= limit) {
                break;
            }
            let body: String = row.get(1)?;
            let document = parse_body(&body)?;
            if query::matches(&document, filter)?.is_some() {
                found.push(document);
            }
        }

        Ok(found)
    }

    fn update_one(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<u64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let Some((seq, mut document, outcome)) = first_match(&tx, ns, filter)? else {
            return Ok(0);
        };
        if !query::apply_update(&mut document, update, outcome)? {
            return Ok(0);
        }

        tx.execute(
            "UPDATE documents SET body = ?1 WHERE seq = ?2;",
            params![serde_json::to_string(&document)?, seq],
        )?;
        tx.commit()?;
        Ok(1)
    }

    fn delete_one(&self, ns: Namespace<'_>, filter: &Document) -> StoreResult<u64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let Some((seq, _, _)) = first_match(&tx, ns, filter)? else {
            return Ok(0);
        };
        tx.execute("DELETE FROM documents WHERE seq = ?1;", [seq])?;
        tx.commit()?;
        Ok(1)
    }
}

fn ensure_collection(conn: &Connection, ns: Namespace<'_>) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO collections (database, name) VALUES (?1, ?2);",
        params![ns.database, ns.collection],
    )?;
    Ok(())
}

fn insert_document(
    conn: &Connection,
    ns: Namespace<'_>,
    mut document: Document,
) -> StoreResult<DocumentId> {
    let id = document
        .entry(ID_FIELD)
        .or_insert_with(|| Value::String(Uuid::new_v4().simple().to_string()))
        .clone();

    conn.execute(
        "INSERT INTO documents (database, collection, id, body) VALUES (?1, ?2, ?3, ?4);",
        params![
            ns.database,
            ns.collection,
            serde_json::to_string(&id)?,
            serde_json::to_string(&document)?,
        ],
    )?;

    Ok(DocumentId::new(id))
}

fn first_match(
    conn: &Connection,
    ns: Namespace<'_>,
    filter: &Document,
) -> StoreResult<Option<(i64, Document, MatchOutcome)>> {
    let mut stmt = conn.prepare(DOCUMENT_SCAN_SQL)?;
    let mut rows = stmt.query(params![ns.database, ns.collection])?;

    while let Some(row) = rows.next()? {
        let seq: i64 = row.get(0)?;
        let body: String = row.get(1)?;
        let document = parse_body(&body)?;
        if let Some(outcome) = query::matches(&document, filter)? {
            return Ok(Some((seq, document, outcome)));
        }
    }

    Ok(None)
}

fn parse_body(body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(document) => Ok(document),
        other => Err(StoreError::Encoding(format!(
            "stored document is not an object: {other}"
        ))),
    }
}
