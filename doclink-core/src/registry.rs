//! The named connection registry.
//!
//! A [`ConnectionRegistry`] is the sole owner of the name to [`ConnectionHandle`] mapping. It
//! holds at most one handle per name and reuses that handle across reconnects, so code that
//! kept a handle (or one of its accessors) keeps working after the target changes.
//!
//! Registries are plain values: construct one per process (or per test) and share it by
//! cloning.
//!
//! ```ignore
//! use doclink_core::registry::ConnectionRegistry;
//! use doclink_memory::InMemoryDriver;
//!
//! let registry = ConnectionRegistry::new(InMemoryDriver::new());
//! let analytics = registry.connect("analytics", "localhost", "metrics", ()).await?;
//! ```

use mea::mutex::Mutex;
use std::{
    collections::BTreeMap,
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    args::{CallArgs, ResolvedArgs},
    config::{ConnectionSettings, RegistryConfig},
    connection::ConnectionHandle,
    driver::Driver,
    error::DocumentStoreResult,
    uri::ConnectOptions,
};

struct RegistryInner {
    driver: Arc<dyn Driver>,
    handles: Mutex<BTreeMap<String, ConnectionHandle>>,
}

/// Named registry of connection handles sharing one driver.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    pub fn from_arc(driver: Arc<dyn Driver>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                driver,
                handles: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Connects the handle named `name` to `host`/`database`.
    ///
    /// Creates the handle on first use. A handle that is already connected is closed and
    /// reopened against the new target, keeping its identity. The handle stays registered
    /// even when opening fails, so a later `connect` can retry it.
    ///
    /// The completion callback receives the outcome of opening.
    ///
    /// # Errors
    ///
    /// Returns the error of closing the previous target or opening the new one.
    pub async fn connect(
        &self,
        name: &str,
        host: &str,
        database: &str,
        args: impl Into<CallArgs<ConnectOptions, ()>>,
    ) -> DocumentStoreResult<ConnectionHandle> {
        let ResolvedArgs { options, callback } = args.into().resolve()?;
        let handle = self.handle_or_create(name).await;

        if handle.is_connected().await {
            tracing::info!(connection = %name, "Reconnecting registered connection");
        }

        callback
            .complete(handle.open(host, database, options).await)
            .map(|_| handle)
    }

    /// Connects `name` using deserialized connection settings.
    pub async fn connect_with(
        &self,
        name: &str,
        settings: &ConnectionSettings,
    ) -> DocumentStoreResult<ConnectionHandle> {
        let options = settings.connect_options()?;
        self.connect(name, &settings.host, &settings.database, options)
            .await
    }

    /// Connects every connection in `config`, stopping at the first failure.
    pub async fn connect_all(&self, config: &RegistryConfig) -> DocumentStoreResult<Vec<ConnectionHandle>> {
        let mut handles = Vec::with_capacity(config.connections.len());

        for (name, settings) in &config.connections {
            handles.push(self.connect_with(name, settings).await?);
        }

        Ok(handles)
    }

    /// Closes the handle named `name`. A no-op when no such handle is registered.
    pub async fn disconnect(&self, name: &str, args: impl Into<CallArgs<(), ()>>) -> DocumentStoreResult<()> {
        let ResolvedArgs { callback, .. } = args.into().resolve()?;

        let result = match self.handle(name).await {
            Some(handle) => {
                tracing::info!(connection = %name, "Disconnecting");
                handle.close(()).await
            }
            None => {
                tracing::debug!(connection = %name, "Disconnect of unknown connection");
                Ok(())
            }
        };

        callback.complete(result)
    }

    /// Closes every registered handle, returning the first error after attempting all.
    pub async fn disconnect_all(&self) -> DocumentStoreResult<()> {
        let handles = self
            .inner
            .handles
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();

        let mut first_error = None;
        for handle in handles {
            if let Err(err) = handle.close(()).await {
                tracing::warn!(connection = %handle.name(), error = %err, "Failed to close connection");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns the handle registered under `name`, if any.
    pub async fn handle(&self, name: &str) -> Option<ConnectionHandle> {
        self.inner
            .handles
            .lock()
            .await
            .get(name)
            .cloned()
    }

    /// Names of every registered handle, in order.
    pub async fn names(&self) -> Vec<String> {
        self.inner
            .handles
            .lock()
            .await
            .keys()
            .cloned()
            .collect()
    }

    async fn handle_or_create(&self, name: &str) -> ConnectionHandle {
        let mut handles = self.inner.handles.lock().await;

        handles
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(connection = %name, "Registering connection");
                ConnectionHandle::new(name, self.inner.driver.clone())
            })
            .clone()
    }
}

impl Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("driver", &self.inner.driver)
            .finish_non_exhaustive()
    }
}
