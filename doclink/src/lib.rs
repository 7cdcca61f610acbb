//! Named, reusable document database connections with schema-driven collection accessors.
//!
//! This crate is the primary entry point for users of doclink. It re-exports the core types
//! and functionality from the sub-crates and provides access to the available drivers.
//!
//! # Features
//!
//! - **Named connections** - A registry keeps at most one handle per name and reuses it across reconnects
//! - **Schema-driven accessors** - get/set/update/delete/create over each registered collection
//! - **Declarative paging** - Page size, page number or last-seen id, translated into cursor configuration
//! - **Optional callbacks** - Every operation resolves its result and hands it to an optional completion callback
//! - **Multiple drivers** - In-memory and MongoDB drivers behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use doclink::{prelude::*, memory::InMemoryDriver};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let registry = ConnectionRegistry::new(InMemoryDriver::new());
//!
//!     // Open (or reopen) the named connection
//!     let analytics = registry.connect("analytics", "localhost", "metrics", ()).await?;
//!
//!     // One accessor per collection schema
//!     analytics
//!         .register_collections([(
//!             "events",
//!             Schema::new().field("ts", FieldSpec::new(FieldType::Number).required()),
//!         )])
//!         .await?;
//!
//!     let events = analytics.collection("events").await?;
//!     let created = events.create(doc! { "ts": 5 }, ()).await?;
//!
//!     // Read it back, ten per page, newest first
//!     let recent = events.get_all(QueryOptions::new().page_size(10)).await?;
//!     println!("{recent:?}");
//!
//!     // Callbacks may take the options position...
//!     events
//!         .get_by_id(created.get("_id").cloned().unwrap_or_default(), CallArgs::callback(|res| {
//!             println!("lookup finished: {}", res.is_ok());
//!         }))
//!         .await?;
//!
//!     // ...or follow the options
//!     events
//!         .get(
//!             doc! { "ts": { "$gte": 5 } },
//!             CallArgs::options(QueryOptions::new().page_size(5).page(2))
//!                 .with_callback(|res| println!("{res:?}")),
//!         )
//!         .await?;
//!
//!     registry.disconnect("analytics", ()).await
//! }
//! ```
//!
//! # Configuration
//!
//! Connections can be declared in YAML and opened together:
//!
//! ```ignore
//! use doclink::{prelude::*, memory::InMemoryDriver};
//!
//! let config = RegistryConfig::from_path("doclink.yaml")?;
//! let registry = ConnectionRegistry::new(InMemoryDriver::new());
//! registry.connect_all(&config).await?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-process driver for development and testing
//! - [`mongodb`] - MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use doclink_core::{
    args, collection, config, connection, driver, error, page, query, registry, schema, uri,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementation.
pub mod memory {
    pub use doclink_memory::{InMemoryConnection, InMemoryDriver};
}

/// MongoDB driver implementation.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doclink_mongodb::{MongoDbConnection, MongoDbDriver};
}
