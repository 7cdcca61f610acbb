//! Named, reusable document database connections with schema-driven collection accessors.
//!
//! This crate is the core of the doclink project and provides:
//!
//! - **Connection registry** ([`registry`]) - At most one named handle per connection, reused across reconnects
//! - **Connection handles** ([`connection`]) - Open/close lifecycle and collection registration
//! - **Collection accessors** ([`collection`]) - get/set/update/delete/create over one collection
//! - **Call arguments** ([`args`]) - Optional options and completion callbacks in either position
//! - **Query options** ([`query`]) - Paging and sorting translated into driver cursor configuration
//! - **Schemas** ([`schema`]) - Field types, defaults and validation for driver-side models
//! - **Driver abstraction** ([`driver`]) - Traits implemented by concrete document database drivers
//! - **Connection targets** ([`uri`]) and **configuration** ([`config`])
//! - **Error handling** ([`error`]) and **pagination** ([`page`])
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use doclink_core::{registry::ConnectionRegistry, schema::{FieldType, Schema}};
//! use doclink_memory::InMemoryDriver;
//!
//! let registry = ConnectionRegistry::new(InMemoryDriver::new());
//! let analytics = registry.connect("analytics", "localhost", "metrics", ()).await?;
//!
//! analytics
//!     .register_collections([("events", Schema::new().field("ts", FieldType::Number))])
//!     .await?;
//!
//! let events = analytics.collection("events").await?;
//! events.create(doc! { "ts": 5 }, ()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclink_core;

pub mod args;
pub mod collection;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod page;
pub mod query;
pub mod registry;
pub mod schema;
pub mod uri;
