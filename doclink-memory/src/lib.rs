//! In-memory document database driver for doclink.
//!
//! This crate provides a thread-safe, in-process implementation of the `Driver` and
//! `DriverConnection` traits. It is the driver used by the test-suite and is handy for
//! development and small deployments.
//!
//! # Features
//!
//! - **Shared databases** - Connections to the same `host:port/database` share their data
//! - **Query language** - Comparison, membership, existence and logical operators over dotted paths
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$push`, `$addToSet`, `$pull`, upserts
//! - **Schema validation** - Documents and updates are checked against the bound model
//! - **Failure injection** - [`InMemoryDriver::set_reachable`] makes connects fail
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use doclink_core::{registry::ConnectionRegistry, schema::{FieldType, Schema}};
//! use doclink_memory::InMemoryDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(InMemoryDriver::new());
//!     let analytics = registry.connect("analytics", "localhost", "metrics", ()).await?;
//!
//!     analytics
//!         .register_collections([("events", Schema::new().field("ts", FieldType::Number))])
//!         .await?;
//!
//!     let events = analytics.collection("events").await?;
//!     events.create(doc! { "ts": 5 }, ()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclink_memory;

pub mod driver;
pub(crate) mod evaluator;
pub(crate) mod update;

pub use driver::{InMemoryConnection, InMemoryDriver};
