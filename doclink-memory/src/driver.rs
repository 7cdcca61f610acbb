//! In-process document database driver.
//!
//! Documents are kept as BSON in insertion order behind async-aware read-write locks.
//! Databases are keyed by `host:port/database`: every connection a driver opens to the
//! same target sees the same data, so reopening a handle keeps its documents.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use doclink_core::{
    driver::{Driver, DriverConnection, UpdateOptions, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{CursorOp, FindPlan, ID_FIELD},
    schema::Schema,
    uri::{ConnectUri, DEFAULT_PORT},
};

use crate::{
    evaluator::{DocumentEvaluator, sort_cmp},
    update::{apply_update, upsert_seed},
};

type CollectionData = Vec<Document>;

#[derive(Debug, Default)]
struct DatabaseState {
    collections: HashMap<String, CollectionData>,
}

type DatabaseRef = Arc<RwLock<DatabaseState>>;

/// Thread-safe in-memory document database driver.
///
/// Cloning the driver shares its databases. Queries scan every document of a collection;
/// there are no indexes.
///
/// # Example
///
/// ```ignore
/// use doclink_core::registry::ConnectionRegistry;
/// use doclink_memory::InMemoryDriver;
///
/// let driver = InMemoryDriver::new();
/// let registry = ConnectionRegistry::new(driver.clone());
///
/// registry.connect("analytics", "localhost", "metrics", ()).await?;
/// assert_eq!(driver.open_connections(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDriver {
    databases: Arc<RwLock<HashMap<String, DatabaseRef>>>,
    reachable: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self {
            databases: Arc::new(RwLock::new(HashMap::new())),
            reachable: Arc::new(AtomicBool::new(true)),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes later connects succeed or fail with a connection error.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Names of the databases created so far, as `host:port/database`.
    pub async fn databases(&self) -> Vec<String> {
        let mut names = self
            .databases
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    async fn database(&self, target: &str) -> DatabaseRef {
        self.databases
            .write()
            .await
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(DatabaseState::default())))
            .clone()
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn connect(
        &self,
        uri: &ConnectUri,
        options: &Document,
    ) -> DocumentStoreResult<Arc<dyn DriverConnection>> {
        let target = format!(
            "{}:{}/{}",
            uri.host().unwrap_or("localhost"),
            uri.port().unwrap_or(DEFAULT_PORT),
            uri.database()
        );

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Connection(format!(
                "failed to connect to {target}: server unreachable"
            )));
        }

        for key in options.keys() {
            tracing::warn!(option = %key, "In-memory driver ignores connection option");
        }

        let database = self.database(&target).await;
        self.open.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(database = %target, "Opened in-memory connection");

        Ok(Arc::new(InMemoryConnection {
            target,
            database,
            models: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            open: self.open.clone(),
        }))
    }
}

/// A connection to one in-memory database.
pub struct InMemoryConnection {
    target: String,
    database: DatabaseRef,
    models: RwLock<HashMap<String, Schema>>,
    closed: AtomicBool,
    open: Arc<AtomicUsize>,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> DocumentStoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Connection(format!(
                "connection to {} is closed",
                self.target
            )));
        }
        Ok(())
    }

    async fn model(&self, collection: &str) -> Option<Schema> {
        self.models.read().await.get(collection).cloned()
    }

    async fn validate_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        match self.model(collection).await {
            Some(schema) => schema.validate_document(document),
            None => Ok(document),
        }
    }

    async fn validate_update(&self, collection: &str, update: Document) -> DocumentStoreResult<Document> {
        match self.model(collection).await {
            Some(schema) => schema.validate_update(update),
            None => Ok(update),
        }
    }

    async fn matching(&self, collection: &str, filter: &Document) -> DocumentStoreResult<Vec<Document>> {
        let database = self.database.read().await;

        match database.collections.get(collection) {
            Some(documents) => DocumentEvaluator::filter_documents(documents, filter),
            None => Ok(Vec::new()),
        }
    }
}

impl Debug for InMemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryConnection")
            .field("target", &self.target)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl DriverConnection for InMemoryConnection {
    async fn bind_model(&self, collection: &str, schema: Schema) -> DocumentStoreResult<()> {
        self.ensure_open()?;

        tracing::debug!(database = %self.target, collection = %collection, fields = schema.len(), "Bound model");
        self.models
            .write()
            .await
            .insert(collection.to_string(), schema);

        Ok(())
    }

    async fn find(&self, collection: &str, plan: FindPlan) -> DocumentStoreResult<Vec<Document>> {
        self.ensure_open()?;

        let mut documents = self.matching(collection, &plan.filter).await?;

        for op in plan.cursor_ops() {
            match op {
                CursorOp::Sort(sort) => documents.sort_by(|a, b| sort_cmp(a, b, &sort)),
                CursorOp::Skip(skip) => {
                    documents = documents
                        .into_iter()
                        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                        .collect();
                }
                CursorOp::Limit(limit) => {
                    documents.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                }
            }
        }

        Ok(documents)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<Option<Document>> {
        self.ensure_open()?;

        let database = self.database.read().await;
        let Some(documents) = database.collections.get(collection) else {
            return Ok(None);
        };

        for document in documents {
            if DocumentEvaluator::new(document).matches(&filter)? {
                return Ok(Some(document.clone()));
            }
        }

        Ok(None)
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.ensure_open()?;

        Ok(self.matching(collection, &filter).await?.len() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        self.ensure_open()?;

        let document = self.validate_document(collection, document).await?;
        let stored = with_id(document);

        let mut database = self.database.write().await;
        let documents = database
            .collections
            .entry(collection.to_string())
            .or_default();

        if documents
            .iter()
            .any(|existing| existing.get(ID_FIELD) == stored.get(ID_FIELD))
        {
            return Err(DocumentStoreError::Validation(format!(
                "duplicate key in collection {collection}: {}",
                stored.get(ID_FIELD).map(ToString::to_string).unwrap_or_default()
            )));
        }

        documents.push(stored.clone());

        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.ensure_open()?;

        let update = self.validate_update(collection, update).await?;
        let model = self.model(collection).await;

        let mut database = self.database.write().await;
        let documents = database
            .collections
            .entry(collection.to_string())
            .or_default();

        let mut outcome = UpdateOutcome::default();
        let mut changed = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if !DocumentEvaluator::new(document).matches(&filter)? {
                continue;
            }

            outcome.matched += 1;

            let mut next = document.clone();
            apply_update(&mut next, &update, false)?;
            if next != *document {
                changed.push((index, next));
            }

            if !options.multi {
                break;
            }
        }

        if outcome.matched == 0 && options.upsert {
            let mut inserted = upsert_seed(&filter);
            apply_update(&mut inserted, &update, true)?;

            let inserted = match &model {
                Some(schema) => schema.validate_document(inserted)?,
                None => inserted,
            };
            let inserted = with_id(inserted);

            outcome.upserted_id = inserted.get(ID_FIELD).cloned();
            documents.push(inserted);

            return Ok(outcome);
        }

        outcome.modified = changed.len() as u64;
        for (index, next) in changed {
            documents[index] = next;
        }

        Ok(outcome)
    }

    async fn delete(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.ensure_open()?;

        let mut database = self.database.write().await;
        let Some(documents) = database.collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut keep = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            keep.push(!DocumentEvaluator::new(document).matches(&filter)?);
        }

        let before = documents.len();
        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));

        Ok((before - documents.len()) as u64)
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(database = %self.target, "Closed in-memory connection");
        }

        Ok(())
    }
}

/// Puts the primary id first, assigning a fresh [`ObjectId`] when the document has none.
fn with_id(mut document: Document) -> Document {
    let id = document
        .remove(ID_FIELD)
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut stored = Document::new();
    stored.insert(ID_FIELD, id);
    for (key, value) in document {
        stored.insert(key, value);
    }
    stored
}
