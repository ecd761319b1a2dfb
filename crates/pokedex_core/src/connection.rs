//! Process-wide store connection and generic collection operations.
//!
//! # Responsibility
//! - Own one store handle and the selected database for the process lifetime.
//! - Validate caller input shape before touching the store.
//! - Wrap store failures with the operation that produced them.
//!
//! # Invariants
//! - Each call is one independent round-trip; nothing is retried.
//! - Writes affect at most one document, except `insert_many`.
//! - "Already exists" is reported as `false`, never as an error.

use crate::config::StoreConfig;
use crate::expr::{self, value_kind};
use crate::store::{
    Document, DocumentId, DocumentStore, MongoStore, Namespace, SqliteDocumentStore, StoreError,
    StoreResult,
};
use log::{debug, error, info};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Instant;

/// Marker field of the throwaway document used to materialize a collection.
const PROBE_FIELD: &str = "_probe";

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Error surfaced by connection-level operations.
#[derive(Debug)]
pub enum ConnectionError {
    /// Caller supplied a malformed shape; no store call was made.
    InvalidInput(String),
    /// The store rejected or failed the named operation.
    Store {
        operation: &'static str,
        source: StoreError,
    },
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Store { operation, source } => write!(f, "error during {operation}: {source}"),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(_) => None,
            Self::Store { source, .. } => Some(source),
        }
    }
}

/// Live connection to one document store with one selected database.
pub struct StoreConnection {
    store: Box<dyn DocumentStore>,
    database: String,
}

impl StoreConnection {
    /// Wraps an already constructed backend.
    pub fn new(store: Box<dyn DocumentStore>, database: impl Into<String>) -> Self {
        Self {
            store,
            database: database.into(),
        }
    }

    /// Connects to the MongoDB deployment described by `config`.
    pub fn connect(config: &StoreConfig) -> ConnectionResult<Self> {
        let store = MongoStore::connect(config).map_err(|source| store_error("connect", source))?;
        Ok(Self::new(Box::new(store), config.database.clone()))
    }

    /// Opens an embedded store file and selects `database` in it.
    pub fn open_embedded(
        path: impl AsRef<Path>,
        database: impl Into<String>,
    ) -> ConnectionResult<Self> {
        let store =
            SqliteDocumentStore::open(path).map_err(|source| store_error("connect", source))?;
        Ok(Self::new(Box::new(store), database))
    }

    /// Opens a throwaway in-memory embedded store.
    pub fn open_embedded_in_memory(database: impl Into<String>) -> ConnectionResult<Self> {
        let store = SqliteDocumentStore::open_in_memory()
            .map_err(|source| store_error("connect", source))?;
        Ok(Self::new(Box::new(store), database))
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Lists collection names of the selected database.
    pub fn list_collections(&self) -> ConnectionResult<Vec<String>> {
        self.run("list_collections", &self.database, "*", |store| {
            store.list_collection_names(&self.database)
        })
    }

    /// Creates `name` in the selected database.
    ///
    /// Returns `false` without touching the store further when it exists.
    pub fn create_collection(&self, name: &str) -> ConnectionResult<bool> {
        self.ensure_collection("create_collection", &self.database, name)
    }

    /// Drops `name`; returns whether it existed.
    pub fn drop_collection(&self, name: &str) -> ConnectionResult<bool> {
        let existed = self.collection_exists("drop_collection", &self.database, name)?;
        if existed {
            self.run("drop_collection", &self.database, name, |store| {
                store.drop_collection(self.namespace(name))
            })?;
        }
        Ok(existed)
    }

    /// Drops a whole database. Dropping a missing database is a no-op.
    pub fn drop_database(&self, db_name: &str) -> ConnectionResult<()> {
        self.run("drop_database", db_name, "*", |store| {
            store.drop_database(db_name)
        })
    }

    /// Inserts one record and returns the store-assigned identity.
    ///
    /// # Errors
    /// - `InvalidInput` when `record` is not a JSON object.
    pub fn insert(&self, collection: &str, record: Value) -> ConnectionResult<DocumentId> {
        let document = into_document(record)?;
        self.run("insert", &self.database, collection, |store| {
            store.insert_one(self.namespace(collection), document)
        })
    }

    /// Inserts several records; all are validated before the store is called.
    pub fn insert_many(
        &self,
        collection: &str,
        records: Vec<Value>,
    ) -> ConnectionResult<Vec<DocumentId>> {
        let documents = records
            .into_iter()
            .map(into_document)
            .collect::<ConnectionResult<Vec<_>>>()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.run("insert_many", &self.database, collection, |store| {
            store.insert_many(self.namespace(collection), documents)
        })
    }

    /// Returns every document matching `filter`.
    pub fn find(&self, collection: &str, filter: &Document) -> ConnectionResult<Vec<Document>> {
        self.run("find", &self.database, collection, |store| {
            store.find(self.namespace(collection), filter, None)
        })
    }

    /// Returns at most `limit` matching documents; `0` means no limit.
    pub fn find_limited(
        &self,
        collection: &str,
        filter: &Document,
        limit: u64,
    ) -> ConnectionResult<Vec<Document>> {
        let limit = (limit > 0).then_some(limit);
        self.run("find_limited", &self.database, collection, |store| {
            store.find(self.namespace(collection), filter, limit)
        })
    }

    /// Merges `new_values` into the first document matching `filter`.
    ///
    /// Returns the modified count (0 or 1).
    pub fn update(
        &self,
        collection: &str,
        filter: &Document,
        new_values: &Document,
    ) -> ConnectionResult<u64> {
        let update = expr::set(new_values.clone());
        self.run("update", &self.database, collection, |store| {
            store.update_one(self.namespace(collection), filter, &update)
        })
    }

    /// Applies a raw operator update to the first document matching `filter`.
    pub fn apply_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> ConnectionResult<u64> {
        self.run("apply_update", &self.database, collection, |store| {
            store.update_one(self.namespace(collection), filter, update)
        })
    }

    /// Removes the first document matching `filter`; returns 0 or 1.
    pub fn delete(&self, collection: &str, filter: &Document) -> ConnectionResult<u64> {
        self.run("delete", &self.database, collection, |store| {
            store.delete_one(self.namespace(collection), filter)
        })
    }

    /// Ensures `db_name` exists with a real (non-lazy) `collection_name`.
    ///
    /// A probe document is inserted and deleted right away so the store
    /// materializes both. Returns `false` when the collection already exists.
    pub fn create_database_and_collection(
        &self,
        db_name: &str,
        collection_name: &str,
    ) -> ConnectionResult<bool> {
        const OPERATION: &str = "create_database_and_collection";

        if self.collection_exists(OPERATION, db_name, collection_name)? {
            info!(
                "event={} module=connection status=skipped reason=exists database={} collection={}",
                OPERATION, db_name, collection_name
            );
            return Ok(false);
        }

        let ns = Namespace::new(db_name, collection_name);
        let probe = expr::eq(PROBE_FIELD, true);
        let id = self.run(OPERATION, db_name, collection_name, |store| {
            store.insert_one(ns, probe)
        })?;
        self.run(OPERATION, db_name, collection_name, |store| {
            store.delete_one(ns, &id.to_filter())
        })?;
        Ok(true)
    }

    fn namespace<'a>(&'a self, collection: &'a str) -> Namespace<'a> {
        Namespace::new(&self.database, collection)
    }

    fn collection_exists(
        &self,
        operation: &'static str,
        database: &str,
        collection: &str,
    ) -> ConnectionResult<bool> {
        let names = self.run(operation, database, collection, |store| {
            store.list_collection_names(database)
        })?;
        Ok(names.iter().any(|name| name == collection))
    }

    fn ensure_collection(
        &self,
        operation: &'static str,
        database: &str,
        collection: &str,
    ) -> ConnectionResult<bool> {
        if self.collection_exists(operation, database, collection)? {
            info!(
                "event={} module=connection status=skipped reason=exists database={} collection={}",
                operation, database, collection
            );
            return Ok(false);
        }
        self.run(operation, database, collection, |store| {
            store.create_collection(Namespace::new(database, collection))
        })?;
        Ok(true)
    }

    fn run<T>(
        &self,
        operation: &'static str,
        database: &str,
        collection: &str,
        call: impl FnOnce(&dyn DocumentStore) -> StoreResult<T>,
    ) -> ConnectionResult<T> {
        let started_at = Instant::now();
        match call(self.store.as_ref()) {
            Ok(value) => {
                debug!(
                    "event={} module=connection status=ok backend={} database={} collection={} duration_ms={}",
                    operation,
                    self.store.backend(),
                    database,
                    collection,
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(source) => {
                error!(
                    "event={} module=connection status=error backend={} database={} collection={} duration_ms={} error={}",
                    operation,
                    self.store.backend(),
                    database,
                    collection,
                    started_at.elapsed().as_millis(),
                    source
                );
                Err(store_error(operation, source))
            }
        }
    }
}

fn into_document(record: Value) -> ConnectionResult<Document> {
    match record {
        Value::Object(document) => Ok(document),
        other => Err(ConnectionError::InvalidInput(format!(
            "record must be a mapping, got {}",
            value_kind(&other)
        ))),
    }
}

fn store_error(operation: &'static str, source: StoreError) -> ConnectionError {
    ConnectionError::Store { operation, source }
}
