use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mea::rwlock::RwLock;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::Arc,
};
use url::Url;

use doclink_core::{
    driver::{Driver, DriverConnection, UpdateOptions, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{CursorOp, FindPlan, ID_FIELD},
    schema::Schema,
    uri::ConnectUri,
};

fn backend(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn connection(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Connection(err.to_string())
}

const DUPLICATE_KEY: i32 = 11000;
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

/// Server error codes that reject the written document itself.
fn rejects_document(code: i32) -> bool {
    matches!(code, DUPLICATE_KEY | DOCUMENT_VALIDATION_FAILURE)
}

/// Maps write errors, reporting rejected documents as validation failures.
fn write(err: mongodb::error::Error) -> DocumentStoreError {
    let rejected = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) if rejects_document(failure.code) => {
            Some(failure.message.clone())
        }
        _ => None,
    };

    match rejected {
        Some(message) => DocumentStoreError::Validation(message),
        None => backend(err),
    }
}

/// Driver opening connections with the official MongoDB client.
#[derive(Debug, Clone, Default)]
pub struct MongoDbDriver;

impl MongoDbDriver {
    pub fn new() -> Self {
        Self
    }

    /// Appends forwarded driver options to the URI query string.
    ///
    /// Options that have no string form (documents, arrays, binary) are skipped.
    pub fn connection_string(uri: &ConnectUri, options: &Document) -> DocumentStoreResult<String> {
        let mut url = Url::parse(uri.as_str())
            .map_err(|err| DocumentStoreError::InvalidOptions(format!("invalid uri: {err}")))?;

        if !options.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in options {
                match query_value(value) {
                    Some(value) => {
                        query.append_pair(key, &value);
                    }
                    None => {
                        tracing::warn!(option = %key, "Ignoring driver option without a string form");
                    }
                }
            }
        }

        Ok(url.to_string())
    }
}

fn query_value(value: &Bson) -> Option<String> {
    match value {
        Bson::String(value) => Some(value.clone()),
        Bson::Boolean(value) => Some(value.to_string()),
        Bson::Int32(value) => Some(value.to_string()),
        Bson::Int64(value) => Some(value.to_string()),
        Bson::Double(value) => Some(value.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Driver for MongoDbDriver {
    async fn connect(
        &self,
        uri: &ConnectUri,
        options: &Document,
    ) -> DocumentStoreResult<Arc<dyn DriverConnection>> {
        let connection_string = Self::connection_string(uri, options)?;

        let client = Client::with_options(
            ClientOptions::parse(&connection_string)
                .await
                .map_err(connection)?,
        )
        .map_err(connection)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection)?;

        tracing::debug!(uri = %uri, "MongoDB connection confirmed");

        Ok(Arc::new(MongoDbConnection {
            client,
            database: uri.database().to_string(),
            models: RwLock::new(HashMap::new()),
        }))
    }
}

/// One MongoDB client bound to a database.
///
/// Models are kept client-side: documents and updates are validated against the bound
/// schema before they are sent to the server.
pub struct MongoDbConnection {
    client: Client,
    database: String,
    models: RwLock<HashMap<String, Schema>>,
}

impl MongoDbConnection {
    fn get_collection(&self, collection: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection)
    }

    async fn model(&self, collection: &str) -> Option<Schema> {
        self.models.read().await.get(collection).cloned()
    }
}

impl Debug for MongoDbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbConnection")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DriverConnection for MongoDbConnection {
    async fn bind_model(&self, collection: &str, schema: Schema) -> DocumentStoreResult<()> {
        self.models
            .write()
            .await
            .insert(collection.to_string(), schema);

        Ok(())
    }

    async fn find(&self, collection: &str, plan: FindPlan) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        for op in plan.cursor_ops() {
            match op {
                CursorOp::Sort(sort) => options.sort = Some(sort),
                CursorOp::Skip(skip) => options.skip = Some(skip),
                CursorOp::Limit(limit) => options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX)),
            }
        }

        self.get_collection(collection)
            .find(plan.filter)
            .with_options(options)
            .await
            .map_err(backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .await
            .map_err(backend)
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(backend)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        let mut document = match self.model(collection).await {
            Some(schema) => schema.validate_document(document)?,
            None => document,
        };

        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, ObjectId::new());
        }

        self.get_collection(collection)
            .insert_one(&document)
            .await
            .map_err(write)?;

        Ok(document)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let update = match self.model(collection).await {
            Some(schema) => schema.validate_update(update)?,
            None => update,
        };

        let update = if update.keys().any(|key| key.starts_with('$')) {
            update
        } else {
            doc! { "$set": update }
        };

        let nothing_to_write = update
            .values()
            .all(|payload| matches!(payload, Bson::Document(fields) if fields.is_empty()));

        if nothing_to_write {
            let matched = self.count(collection, filter).await?;
            return Ok(UpdateOutcome {
                matched: if options.multi { matched } else { matched.min(1) },
                ..Default::default()
            });
        }

        let target = self.get_collection(collection);
        let result = if options.multi {
            target
                .update_many(filter, update)
                .upsert(options.upsert)
                .await
        } else {
            target
                .update_one(filter, update)
                .upsert(options.upsert)
                .await
        }
        .map_err(write)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(filter)
                .await
                .map_err(backend)?
                .deleted_count
        )
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doclink_core::uri::ConnectOptions;

    #[test]
    fn forwarded_options_become_query_parameters() {
        let uri = ConnectUri::build("localhost", "shop", &ConnectOptions::new().user("app").pass("pw"))
            .unwrap();
        let options = doc! { "appName": "orders", "retryWrites": false, "nested": { "a": 1 } };

        assert_eq!(
            MongoDbDriver::connection_string(&uri, &options).unwrap(),
            "mongodb://app:pw@localhost:27017/shop?appName=orders&retryWrites=false"
        );
    }

    #[test]
    fn no_options_leave_uri_untouched() {
        let uri = ConnectUri::build("localhost", "shop", &ConnectOptions::new()).unwrap();

        assert_eq!(
            MongoDbDriver::connection_string(&uri, &Document::new()).unwrap(),
            "mongodb://localhost:27017/shop"
        );
    }

    #[test]
    fn duplicate_keys_and_rejected_documents_are_validation_codes() {
        assert!(rejects_document(11000));
        assert!(rejects_document(121));
        assert!(!rejects_document(13));
        assert!(!rejects_document(50));
    }
}
