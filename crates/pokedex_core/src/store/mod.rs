//! Document store boundary.
//!
//! # Responsibility
//! - Define the native operations a document store backend must provide.
//! - Carry documents as JSON objects so both backends share one shape.
//!
//! # Invariants
//! - Filter and update documents are passed through unchanged; backends own
//!   their interpretation.
//! - Every write touches at most one document, except `insert_many`.

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod mongo;
pub mod query;
pub mod sqlite;

pub use mongo::MongoStore;
pub use query::QueryError;
pub use sqlite::SqliteDocumentStore;

/// Field holding the store-assigned identity of every document.
pub const ID_FIELD: &str = "_id";

/// Generic document shape exchanged with the store.
pub type Document = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// A `(database, collection)` pair addressing one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace<'a> {
    pub database: &'a str,
    pub collection: &'a str,
}

impl<'a> Namespace<'a> {
    pub fn new(database: &'a str, collection: &'a str) -> Self {
        Self {
            database,
            collection,
        }
    }
}

impl Display for Namespace<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Opaque identity assigned by the store on insert.
///
/// Holds the relaxed extended-JSON form of the identity so it can be placed
/// back into a filter document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentId(Value);

impl DocumentId {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Filter matching exactly the document carrying this identity.
    pub fn to_filter(&self) -> Document {
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_string(), self.0.clone());
        filter
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(text) => f.write_str(text),
            Value::Object(map) => match map.get("$oid").and_then(Value::as_str) {
                Some(hex) => f.write_str(hex),
                None => write!(f, "{}", self.0),
            },
            other => write!(f, "{other}"),
        }
    }
}

/// Native operations of a document store.
pub trait DocumentStore: Send + Sync {
    /// Short backend name used in log events.
    fn backend(&self) -> &'static str;
    fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>>;
    fn create_collection(&self, ns: Namespace<'_>) -> StoreResult<()>;
    fn drop_collection(&self, ns: Namespace<'_>) -> StoreResult<()>;
    fn drop_database(&self, database: &str) -> StoreResult<()>;
    fn insert_one(&self, ns: Namespace<'_>, document: Document) -> StoreResult<DocumentId>;
    fn insert_many(
        &self,
        ns: Namespace<'_>,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>>;
    /// Returns matching documents in natural order, at most `limit` when set.
    fn find(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        limit: Option<u64>,
    ) -> StoreResult<Vec<Document>>;
    /// Applies an operator update to the first match; returns modified count.
    fn update_one(&self, ns: Namespace<'_>, filter: &Document, update: &Document)
        -> StoreResult<u64>;
    /// Removes the first match; returns deleted count.
    fn delete_one(&self, ns: Namespace<'_>, filter: &Document) -> StoreResult<u64>;
}

/// Failure reported by a store backend.
#[derive(Debug)]
pub enum StoreError {
    Mongo(mongodb::error::Error),
    Sqlite(rusqlite::Error),
    /// Embedded store file was written by a newer schema.
    SchemaTooNew { found: u32, supported: u32 },
    Query(QueryError),
    Encoding(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mongo(err) => write!(f, "{err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "embedded store schema version {found} is newer than supported {supported}"
            ),
            Self::Query(err) => write!(f, "{err}"),
            Self::Encoding(message) => write!(f, "document encoding failed: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mongo(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::SchemaTooNew { .. } | Self::Encoding(_) => None,
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Mongo(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<QueryError> for StoreError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value.to_string())
    }
}
