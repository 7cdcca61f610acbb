//! Schema-driven collection accessors.
//!
//! A [`CollectionAccessor`] exposes get/set/update/delete/create operations against one
//! named collection of a [`ConnectionHandle`](crate::connection::ConnectionHandle). It holds
//! only a weak reference to its handle: every call leases the handle's live connection, so
//! accessors keep working across a reopen and can never close the connection themselves.
//!
//! Every operation takes a trailing [`CallArgs`] value (see [`crate::args`]); the result is
//! both passed to the resolved callback and returned.
//!
//! # Check-then-act writes
//!
//! `set` and `delete` first look up the documents matching their filter and report
//! [`DocumentStoreError::NotFound`] when there are none, then write to exactly those
//! documents by id. The two steps are not atomic: a concurrent write between them is not
//! detected.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use doclink_core::query::QueryOptions;
//!
//! let events = handle.collection("events").await?;
//! let created = events.create(doc! { "ts": 5 }, ()).await?;
//! let recent = events.get_all(QueryOptions::new().page_size(10)).await?;
//! events.set(doc! { "ts": 5 }, doc! { "seen": true }, ()).await?;
//! ```

use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use std::{
    fmt::{self, Debug},
    sync::{Arc, Weak},
};

use crate::{
    args::{CallArgs, ResolvedArgs},
    connection::{ConnectionLease, HandleInner},
    driver::UpdateOptions,
    error::{DocumentStoreError, DocumentStoreResult},
    page::Page,
    query::{FindPlan, ID_FIELD, QueryOptions},
    schema::Schema,
};

#[derive(Debug)]
struct SchemaState {
    original: Schema,
    current: Schema,
}

struct AccessorInner {
    name: String,
    handle: Weak<HandleInner>,
    schema: RwLock<SchemaState>,
}

/// Accessor for one named collection.
///
/// Cheap to clone; clones share the same schema state.
#[derive(Clone)]
pub struct CollectionAccessor {
    inner: Arc<AccessorInner>,
}

impl CollectionAccessor {
    pub(crate) fn new(name: String, schema: Schema, handle: Weak<HandleInner>) -> Self {
        Self {
            inner: Arc::new(AccessorInner {
                name,
                handle,
                schema: RwLock::new(SchemaState {
                    original: schema.clone(),
                    current: schema,
                }),
            }),
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The schema currently bound, including fields added with [`Self::schema_add`].
    pub async fn schema(&self) -> Schema {
        self.inner.schema.read().await.current.clone()
    }

    /// The schema this accessor was registered with.
    pub async fn original_schema(&self) -> Schema {
        self.inner.schema.read().await.original.clone()
    }

    /// Finds the documents matching `filter`, paged and sorted per the query options.
    ///
    /// An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] for malformed paging options.
    pub async fn get(
        &self,
        filter: Document,
        args: impl Into<CallArgs<QueryOptions, Vec<Document>>>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let ResolvedArgs { options, callback } = args.into().resolve()?;

        callback.complete(self.find(filter, &options).await)
    }

    /// Equivalent to [`Self::get`] with an empty filter.
    pub async fn get_all(
        &self,
        args: impl Into<CallArgs<QueryOptions, Vec<Document>>>,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get(Document::new(), args).await
    }

    /// Point lookup by primary id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when no document has this id.
    pub async fn get_by_id(
        &self,
        id: impl Into<Bson>,
        args: impl Into<CallArgs<(), Document>>,
    ) -> DocumentStoreResult<Document> {
        self.get_one(by_id(id.into()), args).await
    }

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when nothing matches.
    pub async fn get_one(
        &self,
        filter: Document,
        args: impl Into<CallArgs<(), Document>>,
    ) -> DocumentStoreResult<Document> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        callback.complete(self.find_one(filter).await)
    }

    /// Counts the documents matching `filter`.
    pub async fn count(
        &self,
        filter: Document,
        args: impl Into<CallArgs<(), u64>>,
    ) -> DocumentStoreResult<u64> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        callback.complete(self.count_matching(filter).await)
    }

    /// Like [`Self::get`], with the total match count and neighbouring page numbers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] when no page size is given.
    pub async fn get_page(
        &self,
        filter: Document,
        args: impl Into<CallArgs<QueryOptions, Page<Document>>>,
    ) -> DocumentStoreResult<Page<Document>> {
        let ResolvedArgs { options, callback } = args.into().resolve()?;

        callback.complete(self.find_page(filter, &options).await)
    }

    /// Creates a document, letting the driver validate it against the collection schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Validation`] when the driver rejects the document.
    pub async fn create(
        &self,
        data: Document,
        args: impl Into<CallArgs<(), Document>>,
    ) -> DocumentStoreResult<Document> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        callback.complete(self.insert(data).await)
    }

    /// Merges `data` into every document matching `filter` and returns them re-fetched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when nothing matches; no write happens then.
    pub async fn set(
        &self,
        filter: Document,
        data: Document,
        args: impl Into<CallArgs<(), Vec<Document>>>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        callback.complete(self.merge(filter, data).await)
    }

    /// [`Self::set`] scoped to one primary id.
    pub async fn set_by_id(
        &self,
        id: impl Into<Bson>,
        data: Document,
        args: impl Into<CallArgs<(), Document>>,
    ) -> DocumentStoreResult<Document> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;
        let filter = by_id(id.into());

        let result = self
            .merge(filter.clone(), data)
            .await
            .and_then(|documents| first_or_not_found(&self.inner.name, &filter, documents));

        callback.complete(result)
    }

    /// Forwards a full update expression to the driver.
    ///
    /// Unlike [`Self::set`] there is no existence check: the driver's matched count decides
    /// whether the filter hit anything. Returns the documents the write targeted (only the
    /// first match unless `multi` is set), re-fetched by id, plus the upserted document when
    /// an upsert inserted one.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when the driver matched nothing and did not
    /// upsert.
    pub async fn update(
        &self,
        filter: Document,
        update: Document,
        args: impl Into<CallArgs<UpdateOptions, Vec<Document>>>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let ResolvedArgs { options, callback } = args.into().resolve()?;

        callback.complete(self.apply_update(filter, update, options).await)
    }

    /// [`Self::update`] scoped to one primary id.
    pub async fn update_by_id(
        &self,
        id: impl Into<Bson>,
        update: Document,
        args: impl Into<CallArgs<(), Document>>,
    ) -> DocumentStoreResult<Document> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;
        let filter = by_id(id.into());

        let result = self
            .apply_update(filter.clone(), update, UpdateOptions::new().multi(false))
            .await
            .and_then(|documents| first_or_not_found(&self.inner.name, &filter, documents));

        callback.complete(result)
    }

    /// Deletes every document matching `filter` and returns them.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when nothing matches.
    pub async fn delete(
        &self,
        filter: Document,
        args: impl Into<CallArgs<(), Vec<Document>>>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        callback.complete(self.remove(filter).await)
    }

    /// Deletes the document with this primary id and returns it.
    ///
    /// Repeating the call once the document is gone yields [`DocumentStoreError::NotFound`].
    pub async fn delete_by_id(
        &self,
        id: impl Into<Bson>,
        args: impl Into<CallArgs<(), Document>>,
    ) -> DocumentStoreResult<Document> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;
        let filter = by_id(id.into());

        let result = self
            .remove(filter.clone())
            .await
            .and_then(|documents| first_or_not_found(&self.inner.name, &filter, documents));

        callback.complete(result)
    }

    /// Extends the live schema with `fields` and rebinds the model when connected.
    pub async fn schema_add(
        &self,
        fields: Schema,
        args: impl Into<CallArgs<(), ()>>,
    ) -> DocumentStoreResult<()> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        self.inner.schema.write().await.current.extend(fields);
        tracing::debug!(collection = %self.name(), "Extended schema");

        callback.complete(self.rebind().await)
    }

    /// Discards fields added with [`Self::schema_add`], rebuilding the model from the
    /// schema the collection was registered with.
    pub async fn schema_reset(&self, args: impl Into<CallArgs<(), ()>>) -> DocumentStoreResult<()> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        {
            let mut schema = self.inner.schema.write().await;
            schema.current = schema.original.clone();
        }
        tracing::debug!(collection = %self.name(), "Reset schema");

        callback.complete(self.rebind().await)
    }

    pub(crate) async fn bind(&self, lease: &ConnectionLease) -> DocumentStoreResult<()> {
        lease.bind_model(self.name(), self.schema().await).await
    }

    async fn rebind(&self) -> DocumentStoreResult<()> {
        match self.lease().await {
            Ok(lease) => self.bind(&lease).await,
            Err(DocumentStoreError::NotConnected(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn lease(&self) -> DocumentStoreResult<ConnectionLease> {
        match self.inner.handle.upgrade() {
            Some(handle) => handle.lease().await,
            None => Err(DocumentStoreError::NotConnected(format!(
                "(dropped handle of {})",
                self.inner.name
            ))),
        }
    }

    async fn find(&self, filter: Document, options: &QueryOptions) -> DocumentStoreResult<Vec<Document>> {
        let plan = options.translate(filter)?;
        tracing::debug!(collection = %self.name(), filter = %plan.filter, "get");

        self.lease()
            .await?
            .find(self.name(), plan)
            .await
    }

    async fn find_one(&self, filter: Document) -> DocumentStoreResult<Document> {
        tracing::debug!(collection = %self.name(), filter = %filter, "get_one");

        self.lease()
            .await?
            .find_one(self.name(), filter.clone())
            .await?
            .ok_or_else(|| DocumentStoreError::not_found(self.name(), &filter))
    }

    async fn count_matching(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.lease()
            .await?
            .count(self.name(), filter)
            .await
    }

    async fn find_page(
        &self,
        filter: Document,
        options: &QueryOptions,
    ) -> DocumentStoreResult<Page<Document>> {
        let page_size = options.validated_page_size()?.ok_or_else(|| {
            DocumentStoreError::InvalidOptions("get_page requires a page size".to_string())
        })?;

        let lease = self.lease().await?;
        let count = lease.count(self.name(), filter.clone()).await?;
        let items = lease
            .find(self.name(), options.translate(filter)?)
            .await?;

        Ok(match options.last_id {
            Some(_) => Page::builder(items).with_count(count).build(),
            None => Page::for_offset(items, count, options.validated_page()?, page_size),
        })
    }

    async fn insert(&self, data: Document) -> DocumentStoreResult<Document> {
        tracing::debug!(collection = %self.name(), "create");

        self.lease()
            .await?
            .insert_one(self.name(), data)
            .await
    }

    async fn merge(&self, filter: Document, data: Document) -> DocumentStoreResult<Vec<Document>> {
        tracing::debug!(collection = %self.name(), filter = %filter, "set");

        let lease = self.lease().await?;
        let targets = self.matching_ids(&lease, filter).await?;

        lease
            .update(self.name(), targets.clone(), doc! { "$set": data }, UpdateOptions::default())
            .await?;

        lease
            .find(self.name(), FindPlan::new(targets))
            .await
    }

    async fn apply_update(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        tracing::debug!(collection = %self.name(), filter = %filter, update = %update, "update");

        let lease = self.lease().await?;

        // Capture the targets before writing: the update may change fields the filter uses.
        let mut targets = FindPlan::new(filter.clone());
        if !options.multi {
            targets = targets.with_limit(1);
        }
        let mut ids = ids_of(&lease.find(self.name(), targets).await?);

        let outcome = lease
            .update(self.name(), filter.clone(), update, options)
            .await?;

        if outcome.matched == 0 && outcome.upserted_id.is_none() {
            return Err(DocumentStoreError::not_found(self.name(), &filter));
        }

        if let Some(id) = outcome.upserted_id {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        lease
            .find(self.name(), FindPlan::new(ids_filter(ids)))
            .await
    }

    async fn remove(&self, filter: Document) -> DocumentStoreResult<Vec<Document>> {
        tracing::debug!(collection = %self.name(), filter = %filter, "delete");

        let lease = self.lease().await?;
        let documents = lease
            .find(self.name(), FindPlan::new(filter.clone()))
            .await?;

        if documents.is_empty() {
            return Err(DocumentStoreError::not_found(self.name(), &filter));
        }

        lease
            .delete(self.name(), ids_filter(ids_of(&documents)))
            .await?;

        Ok(documents)
    }

    /// The existence check of a check-then-act write: an `_id $in` filter over the
    /// documents currently matching `filter`.
    async fn matching_ids(
        &self,
        lease: &ConnectionLease,
        filter: Document,
    ) -> DocumentStoreResult<Document> {
        let documents = lease
            .find(self.name(), FindPlan::new(filter.clone()))
            .await?;

        if documents.is_empty() {
            return Err(DocumentStoreError::not_found(self.name(), &filter));
        }

        Ok(ids_filter(ids_of(&documents)))
    }
}

impl Debug for CollectionAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionAccessor")
            .field("name", &self.inner.name)
            .field(
                "connection",
                &self
                    .inner
                    .handle
                    .upgrade()
                    .map(|handle| handle.name().to_string()),
            )
            .finish()
    }
}

fn by_id(id: Bson) -> Document {
    doc! { ID_FIELD: id }
}

fn ids_of(documents: &[Document]) -> Vec<Bson> {
    documents
        .iter()
        .filter_map(|document| document.get(ID_FIELD).cloned())
        .collect()
}

fn ids_filter(ids: Vec<Bson>) -> Document {
    doc! { ID_FIELD: { "$in": ids } }
}

fn first_or_not_found(
    collection: &str,
    filter: &Document,
    documents: Vec<Document>,
) -> DocumentStoreResult<Document> {
    documents
        .into_iter()
        .next()
        .ok_or_else(|| DocumentStoreError::not_found(collection, filter))
}
