//! Convenient re-exports of commonly used types from doclink.
//!
//! ```ignore
//! use doclink::prelude::*;
//! ```

pub use doclink_core::{
    args::{CallArgs, Callback},
    collection::CollectionAccessor,
    config::{ConnectionSettings, RegistryConfig},
    connection::{ConnectionHandle, ConnectionState},
    driver::{Driver, DriverConnection, UpdateOptions, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    page::Page,
    query::{FindPlan, ID_FIELD, QueryOptions, SortDirection, SortOrder},
    registry::ConnectionRegistry,
    schema::{FieldSpec, FieldType, Schema},
    uri::{ConnectOptions, ConnectUri},
};
