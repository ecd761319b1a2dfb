//! MongoDB backend over the driver's synchronous API.
//!
//! # Responsibility
//! - Translate JSON documents to BSON through extended JSON and back.
//! - Forward every operation to the server as a single round-trip.
//!
//! # Invariants
//! - Identities leave this module as relaxed extended JSON, so an ObjectId
//!   round-trips through `DocumentId::to_filter`.

use super::{Document, DocumentId, DocumentStore, Namespace, StoreError, StoreResult};
use crate::config::StoreConfig;
use log::info;
use mongodb::bson::{Bson, Document as BsonDocument};
use mongodb::options::{ClientOptions, Credential};
use mongodb::sync::{Client, Collection};
use serde_json::Value;

const APP_NAME: &str = "pokedex";

/// `DocumentStore` backed by a MongoDB deployment.
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Builds a client for the configured deployment.
    ///
    /// The driver connects lazily; server failures surface on first use.
    pub fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(config.connection_uri()).run()?;
        options.app_name = Some(APP_NAME.to_string());
        if let Some(credentials) = &config.credentials {
            options.credential = Some(
                Credential::builder()
                    .username(credentials.username.clone())
                    .password(credentials.password.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options)?;
        info!(
            "event=store_connect module=store status=ok backend=mongodb authenticated={}",
            config.credentials.is_some()
        );
        Ok(Self { client })
    }

    fn collection(&self, ns: Namespace<'_>) -> Collection<BsonDocument> {
        self.client
            .database(ns.database)
            .collection::<BsonDocument>(ns.collection)
    }
}

impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .client
            .database(database)
            .list_collection_names()
            .run()?)
    }

    fn create_collection(&self, ns: Namespace<'_>) -> StoreResult<()> {
        self.client
            .database(ns.database)
            .create_collection(ns.collection)
            .run()?;
        Ok(())
    }

    fn drop_collection(&self, ns: Namespace<'_>) -> StoreResult<()> {
        self.collection(ns).drop().run()?;
        Ok(())
    }

    fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.client.database(database).drop().run()?;
        Ok(())
    }

    fn insert_one(&self, ns: Namespace<'_>, document: Document) -> StoreResult<DocumentId> {
        let result = self
            .collection(ns)
            .insert_one(to_bson_document(&document)?)
            .run()?;
        Ok(document_id(result.inserted_id))
    }

    fn insert_many(
        &self,
        ns: Namespace<'_>,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        let documents = documents
            .iter()
            .map(to_bson_document)
            .collect::<StoreResult<Vec<_>>>()?;
        let result = self.collection(ns).insert_many(documents).run()?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| document_id(id)).collect())
    }

    fn find(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        limit: Option<u64>,
    ) -> StoreResult<Vec<Document>> {
        let collection = self.collection(ns);
        let mut action = collection.find(to_bson_document(filter)?);
        if let Some(limit) = limit {
            let limit = i64::try_from(limit)
                .map_err(|_| StoreError::Encoding(format!("limit {limit} is out of range")))?;
            action = action.limit(limit);
        }

        let mut documents = Vec::new();
        for document in action.run()? {
            documents.push(from_bson_document(document?)?);
        }
        Ok(documents)
    }

    fn update_one(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<u64> {
        let result = self
            .collection(ns)
            .update_one(to_bson_document(filter)?, to_bson_document(update)?)
            .run()?;
        Ok(result.modified_count)
    }

    fn delete_one(&self, ns: Namespace<'_>, filter: &Document) -> StoreResult<u64> {
        let result = self
            .collection(ns)
            .delete_one(to_bson_document(filter)?)
            .run()?;
        Ok(result.deleted_count)
    }
}

/// Parses a JSON document as extended JSON (`$oid`, `$date`, ...).
pub(crate) fn to_bson_document(document: &Document) -> StoreResult<BsonDocument> {
    match Bson::try_from(Value::Object(document.clone())) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(StoreError::Encoding(format!(
            "expected a document, got {other}"
        ))),
        Err(err) => Err(StoreError::Encoding(err.to_string())),
    }
}

pub(crate) fn from_bson_document(document: BsonDocument) -> StoreResult<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(document) => Ok(document),
        other => Err(StoreError::Encoding(format!(
            "expected a document, got {other}"
        ))),
    }
}

fn document_id(id: Bson) -> DocumentId {
    DocumentId::new(id.into_relaxed_extjson())
}
