//! Error types and result types for document store operations.
//!
//! Paging input is never an error source (malformed values fall back to defaults) and
//! redaction never fails, so almost every variant here originates in a backend, in
//! (de)serialization, or in entity validation. Use [`DocumentStoreResult<T>`] as the
//! return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document has an invalid structure (e.g. it is not a BSON document).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An entity failed its field validation rules.
    #[error("Validation error: {0}")]
    Validation(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
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
