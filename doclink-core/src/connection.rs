//! Named connection handles.
//!
//! A [`ConnectionHandle`] owns one named connection to the external store and the
//! collection accessors registered on it. Handles are created by the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry) and survive `close`, so the
//! same handle can be reopened against a new target.
//!
//! # State machine
//!
//! `Disconnected -> Connecting -> Connected`, and `Connected -> Disconnected` on close. A
//! failed open falls back to `Disconnected` and reports the driver's error. Transitions
//! on one handle are serialized: an open racing a close (or another open) waits for it.

use bson::Document;
use chrono::{DateTime, Utc};
use mea::{mutex::Mutex, rwlock::RwLock};
use std::{
    collections::BTreeMap,
    fmt::{self, Debug},
    sync::Arc,
};
use uuid::Uuid;

use crate::{
    args::{CallArgs, ResolvedArgs},
    collection::CollectionAccessor,
    driver::{Driver, DriverConnection, UpdateOptions, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    query::FindPlan,
    schema::Schema,
    uri::{ConnectOptions, ConnectUri},
};

/// Lifecycle state of a [`ConnectionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
struct HandleState {
    status: ConnectionState,
    uri: Option<ConnectUri>,
    options: Document,
    connection: Option<Arc<dyn DriverConnection>>,
    connected_since: Option<DateTime<Utc>>,
}

pub(crate) struct HandleInner {
    id: Uuid,
    name: String,
    driver: Arc<dyn Driver>,
    transition: Mutex<()>,
    state: RwLock<HandleState>,
    collections: RwLock<BTreeMap<String, CollectionAccessor>>,
}

impl HandleInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Leases the live connection to an accessor.
    pub(crate) async fn lease(&self) -> DocumentStoreResult<ConnectionLease> {
        let state = self.state.read().await;

        match (&state.status, &state.connection) {
            (ConnectionState::Connected, Some(connection)) => {
                Ok(ConnectionLease(connection.clone()))
            }
            _ => Err(DocumentStoreError::NotConnected(self.name.clone())),
        }
    }
}

/// A handle on one named connection.
///
/// Cheap to clone; clones share the same connection and identity.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                name: name.into(),
                driver,
                transition: Mutex::new(()),
                state: RwLock::new(HandleState {
                    status: ConnectionState::Disconnected,
                    uri: None,
                    options: Document::new(),
                    connection: None,
                    connected_since: None,
                }),
                collections: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// The registry name of this connection.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identity of this handle, stable across close and reopen.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns `true` when both handles are the same logical handle.
    pub fn ptr_eq(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.read().await.status
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// The URI of the current (or last attempted) target.
    pub async fn uri(&self) -> Option<ConnectUri> {
        self.inner.state.read().await.uri.clone()
    }

    /// The options forwarded to the driver for the current target.
    pub async fn connect_options(&self) -> Document {
        self.inner.state.read().await.options.clone()
    }

    pub async fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.connected_since
    }

    /// Opens this handle against `host`/`database`.
    ///
    /// An already connected handle closes its current target first. Every registered
    /// collection is rebound on the new connection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Connection`] when the driver cannot connect (the handle
    /// is left `Disconnected`) and [`DocumentStoreError::InvalidOptions`] for a malformed
    /// target.
    pub async fn open(
        &self,
        host: &str,
        database: &str,
        args: impl Into<CallArgs<ConnectOptions, ()>>,
    ) -> DocumentStoreResult<()> {
        let ResolvedArgs { options, callback } = args.into().resolve()?;
        let _transition = self.inner.transition.lock().await;

        callback.complete(self.open_locked(host, database, options).await)
    }

    async fn open_locked(
        &self,
        host: &str,
        database: &str,
        options: ConnectOptions,
    ) -> DocumentStoreResult<()> {
        let uri = ConnectUri::build(host, database, &options)?;

        if self.state().await == ConnectionState::Connected {
            tracing::info!(connection = %self.name(), "Closing current target before reopening");
            self.close_locked().await?;
        }

        {
            let mut state = self.inner.state.write().await;
            state.status = ConnectionState::Connecting;
            state.uri = Some(uri.clone());
            state.options = options.driver_options().clone();
        }

        tracing::info!(connection = %self.name(), uri = %uri, "Opening connection");

        let connection = match self
            .inner
            .driver
            .connect(&uri, options.driver_options())
            .await
        {
            Ok(connection) => connection,
            Err(err) => {
                tracing::warn!(connection = %self.name(), uri = %uri, error = %err, "Failed to open connection");
                self.inner.state.write().await.status = ConnectionState::Disconnected;
                return Err(err);
            }
        };

        if let Err(err) = self.bind_all(&ConnectionLease(connection.clone())).await {
            tracing::warn!(connection = %self.name(), error = %err, "Failed to bind collections, closing");
            if let Err(close_err) = connection.close().await {
                tracing::warn!(connection = %self.name(), error = %close_err, "Failed to close connection after bind failure");
            }
            self.inner.state.write().await.status = ConnectionState::Disconnected;
            return Err(err);
        }

        let mut state = self.inner.state.write().await;
        state.status = ConnectionState::Connected;
        state.connection = Some(connection);
        state.connected_since = Some(Utc::now());

        tracing::info!(connection = %self.name(), "Connection established");

        Ok(())
    }

    /// Closes the underlying connection. A no-op on a handle that is not connected.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Connection`] when the driver fails to close; the handle
    /// then stays `Connected`.
    pub async fn close(&self, args: impl Into<CallArgs<(), ()>>) -> DocumentStoreResult<()> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;
        let _transition = self.inner.transition.lock().await;

        callback.complete(self.close_locked().await)
    }

    async fn close_locked(&self) -> DocumentStoreResult<()> {
        let connection = {
            let state = self.inner.state.read().await;
            match (&state.status, &state.connection) {
                (ConnectionState::Connected, Some(connection)) => connection.clone(),
                _ => {
                    tracing::debug!(connection = %self.name(), "Close on a disconnected handle");
                    return Ok(());
                }
            }
        };

        tracing::info!(connection = %self.name(), "Closing connection");
        connection.close().await?;

        let mut state = self.inner.state.write().await;
        state.status = ConnectionState::Disconnected;
        state.connection = None;
        state.connected_since = None;

        Ok(())
    }

    /// Registers one collection accessor per schema entry, replacing accessors already
    /// registered under the same name. When connected, the models are bound immediately.
    /// Registration waits for an open or close in progress to finish.
    ///
    /// # Errors
    ///
    /// Returns the driver's error when binding a model on the live connection fails.
    pub async fn register_collections<I, K>(&self, schemas: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        let accessors = schemas
            .into_iter()
            .map(|(name, schema)| {
                CollectionAccessor::new(name.into(), schema, Arc::downgrade(&self.inner))
            })
            .collect::<Vec<_>>();

        let _transition = self.inner.transition.lock().await;
        let lease = self.inner.lease().await.ok();

        let mut collections = self.inner.collections.write().await;
        for accessor in accessors {
            if let Some(lease) = &lease {
                accessor.bind(lease).await?;
            }

            tracing::debug!(connection = %self.name(), collection = %accessor.name(), "Registered collection");
            collections.insert(accessor.name().to_string(), accessor);
        }

        Ok(())
    }

    /// Looks up the accessor registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::CollectionNotRegistered`] for an unknown name.
    pub async fn collection(&self, name: &str) -> DocumentStoreResult<CollectionAccessor> {
        self.inner
            .collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DocumentStoreError::CollectionNotRegistered(name.to_string()))
    }

    pub async fn collection_names(&self) -> Vec<String> {
        self.inner
            .collections
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }

    async fn bind_all(&self, lease: &ConnectionLease) -> DocumentStoreResult<()> {
        let accessors = self
            .inner
            .collections
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();

        for accessor in accessors {
            accessor.bind(lease).await?;
        }

        Ok(())
    }
}

impl Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("driver", &self.inner.driver)
            .finish()
    }
}

/// Non-owning access to a handle's live connection.
///
/// Forwards the model and CRUD surface of [`DriverConnection`] but not `close`, so only the
/// owning handle can end the connection's lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionLease(Arc<dyn DriverConnection>);

impl ConnectionLease {
    pub(crate) async fn bind_model(&self, collection: &str, schema: Schema) -> DocumentStoreResult<()> {
        self.0.bind_model(collection, schema).await
    }

    pub(crate) async fn find(
        &self,
        collection: &str,
        plan: FindPlan,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.0.find(collection, plan).await
    }

    pub(crate) async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        self.0.find_one(collection, filter).await
    }

    pub(crate) async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.0.count(collection, filter).await
    }

    pub(crate) async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> DocumentStoreResult<Document> {
        self.0.insert_one(collection, document).await
    }

    pub(crate) async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.0
            .update(collection, filter, update, options)
            .await
    }

    pub(crate) async fn delete(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.0.delete(collection, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct StubConnection {
        fail_close: AtomicBool,
        fail_bind: AtomicBool,
        closes: AtomicUsize,
        binds: AtomicUsize,
        bound: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DriverConnection for StubConnection {
        async fn bind_model(&self, collection: &str, _schema: Schema) -> DocumentStoreResult<()> {
            // Suspend so a concurrent caller can interleave with an open in progress.
            tokio::task::yield_now().await;

            if self.fail_bind.load(Ordering::SeqCst) {
                return Err(DocumentStoreError::Backend("model rejected".to_string()));
            }
            self.binds.fetch_add(1, Ordering::SeqCst);
            self.bound.lock().unwrap().push(collection.to_string());
            Ok(())
        }

        async fn find(&self, _collection: &str, _plan: FindPlan) -> DocumentStoreResult<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn find_one(
            &self,
            _collection: &str,
            _filter: Document,
        ) -> DocumentStoreResult<Option<Document>> {
            Ok(None)
        }

        async fn count(&self, _collection: &str, _filter: Document) -> DocumentStoreResult<u64> {
            Ok(0)
        }

        async fn insert_one(&self, _collection: &str, document: Document) -> DocumentStoreResult<Document> {
            Ok(document)
        }

        async fn update(
            &self,
            _collection: &str,
            _filter: Document,
            _update: Document,
            _options: UpdateOptions,
        ) -> DocumentStoreResult<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }

        async fn delete(&self, _collection: &str, _filter: Document) -> DocumentStoreResult<u64> {
            Ok(0)
        }

        async fn close(&self) -> DocumentStoreResult<()> {
            if self.fail_close.load(Ordering::SeqCst) {
                return Err(DocumentStoreError::Connection("close interrupted".to_string()));
            }
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct StubDriver {
        connection: Arc<StubConnection>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Driver for StubDriver {
        async fn connect(
            &self,
            _uri: &ConnectUri,
            _options: &Document,
        ) -> DocumentStoreResult<Arc<dyn DriverConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let connection: Arc<dyn DriverConnection> = self.connection.clone();
            Ok(connection)
        }
    }

    fn handle() -> (ConnectionHandle, Arc<StubConnection>, Arc<StubDriver>) {
        let connection = Arc::new(StubConnection::default());
        let driver = Arc::new(StubDriver {
            connection: connection.clone(),
            connects: AtomicUsize::new(0),
        });

        (ConnectionHandle::new("stub", driver.clone()), connection, driver)
    }

    #[tokio::test]
    async fn failed_close_leaves_the_handle_connected() {
        let (handle, connection, _driver) = handle();
        handle.open("localhost", "db", ()).await.unwrap();

        connection.fail_close.store(true, Ordering::SeqCst);
        let err = handle.close(()).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Connection(_)));
        assert_eq!(handle.state().await, ConnectionState::Connected);

        connection.fail_close.store(false, Ordering::SeqCst);
        handle.close(()).await.unwrap();
        assert_eq!(handle.state().await, ConnectionState::Disconnected);
        assert_eq!(connection.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reopening_closes_the_previous_connection_first() {
        let (handle, connection, driver) = handle();

        handle.open("localhost", "a", ()).await.unwrap();
        let first_since = handle.connected_since().await;
        handle.open("localhost", "b", ()).await.unwrap();

        assert_eq!(driver.connects.load(Ordering::SeqCst), 2);
        assert_eq!(connection.closes.load(Ordering::SeqCst), 1);
        assert!(handle.is_connected().await);
        assert!(handle.connected_since().await >= first_since);
    }

    #[tokio::test]
    async fn registered_collections_are_bound_on_every_open() {
        let (handle, connection, _driver) = handle();

        handle
            .register_collections([("a", Schema::new()), ("b", Schema::new())])
            .await
            .unwrap();
        assert_eq!(connection.binds.load(Ordering::SeqCst), 0);

        handle.open("localhost", "db", ()).await.unwrap();
        assert_eq!(connection.binds.load(Ordering::SeqCst), 2);

        handle.open("localhost", "db", ()).await.unwrap();
        assert_eq!(connection.binds.load(Ordering::SeqCst), 4);
        assert_eq!(handle.collection_names().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn accessors_are_not_connected_before_open() {
        let (handle, _connection, _driver) = handle();
        handle
            .register_collections([("a", Schema::new())])
            .await
            .unwrap();

        let accessor = handle.collection("a").await.unwrap();
        let err = accessor.count(Document::new(), ()).await.unwrap_err();
        assert_eq!(err, DocumentStoreError::NotConnected("stub".to_string()));
    }

    #[tokio::test]
    async fn registration_during_open_is_bound_on_the_new_connection() {
        let (handle, connection, _driver) = handle();
        handle
            .register_collections([("a", Schema::new())])
            .await
            .unwrap();

        let (opened, registered) = tokio::join!(
            handle.open("localhost", "db", ()),
            handle.register_collections([("b", Schema::new())]),
        );
        opened.unwrap();
        registered.unwrap();

        assert!(handle.is_connected().await);
        assert_eq!(
            *connection.bound.lock().unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn bind_failure_reports_the_bind_error_even_when_cleanup_close_fails() {
        let (handle, connection, _driver) = handle();
        handle
            .register_collections([("a", Schema::new())])
            .await
            .unwrap();

        connection.fail_bind.store(true, Ordering::SeqCst);
        connection.fail_close.store(true, Ordering::SeqCst);

        let err = handle.open("localhost", "db", ()).await.unwrap_err();
        assert_eq!(err, DocumentStoreError::Backend("model rejected".to_string()));
        assert_eq!(handle.state().await, ConnectionState::Disconnected);
        assert_eq!(connection.closes.load(Ordering::SeqCst), 0);
    }
}
