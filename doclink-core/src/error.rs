//! Error types and result types for connection and collection operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. The same
//! result is handed, by reference, to the completion callback resolved for the call
//! (see [`crate::args`]), so callers may consume errors from either channel.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use serde_yaml::Error as SerdeYamlError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a document store
/// through a named connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// A targeted filter or id matched zero documents.
    /// The first argument is the collection name, the second a rendering of the filter.
    #[error("No document matching {1} in collection {0}")]
    NotFound(String, String),
    /// The driver rejected a document against the registered schema.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The driver failed to open or close a connection.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Malformed call arguments or paging parameters.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    /// The named connection is not currently connected.
    #[error("Connection {0} is not connected")]
    NotConnected(String),
    /// No accessor has been registered under the given collection name.
    #[error("Collection not registered: {0}")]
    CollectionNotRegistered(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Any other failure reported by the underlying driver.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Builds a [`DocumentStoreError::NotFound`] for a filter document.
    pub fn not_found(collection: &str, filter: &bson::Document) -> Self {
        DocumentStoreError::NotFound(collection.to_string(), filter.to_string())
    }

    /// Returns `true` when this error is a [`DocumentStoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound(..))
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeYamlError> for DocumentStoreError {
    fn from(err: SerdeYamlError) -> Self {
        DocumentStoreError::Config(err.to_string())
    }
}
