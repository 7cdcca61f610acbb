//! Document database driver abstraction.
//!
//! This module defines the seam to the external document database driver. A [`Driver`]
//! opens connections; a [`DriverConnection`] binds per-collection models and executes
//! finds and writes against them.
//!
//! # Overview
//!
//! Implementations are required to be thread-safe (`Send + Sync`). Filters, update
//! expressions and cursor configuration are passed through unmodified; interpreting them is
//! the driver's job. Schema validation is delegated to the driver's model for the collection,
//! bound with [`DriverConnection::bind_model`].
//!
//! # Ownership
//!
//! Connections are shared as `Arc<dyn DriverConnection>` and owned by exactly one
//! connection handle. Collection accessors reach a connection only through a lease that
//! does not expose [`DriverConnection::close`].

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::DocumentStoreResult,
    query::FindPlan,
    schema::Schema,
    uri::ConnectUri,
};

/// Options for update writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document built from the filter and update when nothing matches.
    pub upsert: bool,
    /// Update every match instead of only the first one.
    pub multi: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { upsert: false, multi: true }
    }
}

/// What an update write reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of documents that matched the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
    /// Primary id of the inserted document when an upsert inserted one.
    pub upserted_id: Option<Bson>,
}

/// Factory for driver connections.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Opens a connection to `uri`, forwarding the remaining driver `options`.
    ///
    /// Completes only once the driver considers the connection established.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Connection`](crate::error::DocumentStoreError::Connection)
    /// carrying the driver's message when the connection cannot be established.
    async fn connect(
        &self,
        uri: &ConnectUri,
        options: &Document,
    ) -> DocumentStoreResult<Arc<dyn DriverConnection>>;
}

/// One open connection to a database.
#[async_trait]
pub trait DriverConnection: Send + Sync + Debug {
    /// Constructs (or replaces) the model for `collection` from `schema`.
    async fn bind_model(&self, collection: &str, schema: Schema) -> DocumentStoreResult<()>;

    /// Runs a configured find and collects the matching documents.
    async fn find(&self, collection: &str, plan: FindPlan) -> DocumentStoreResult<Vec<Document>>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Validates `document` against the collection model and inserts it, assigning a
    /// primary id when missing. Returns the stored document.
    async fn insert_one(&self, collection: &str, document: Document)
    -> DocumentStoreResult<Document>;

    /// Applies an update expression to the documents matching `filter`.
    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes every document matching `filter`, returning how many were removed.
    async fn delete(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Closes the connection and releases its resources.
    async fn close(&self) -> DocumentStoreResult<()>;
}
