//! Storage backend abstraction.
//!
//! Persistence, filtering and sorting are delegated to a [`StoreBackend`]; everything
//! in this crate only reads through it (pagination, population) or writes plain
//! documents (collections). Backends must be `Send + Sync` because pagination issues
//! its count and fetch concurrently.
//!
//! # Example
//!
//! ```ignore
//! use docshape::backend::StoreBackend;
//! use bson::{Uuid, Bson, doc};
//!
//! let backend = MyBackend::new();
//! let id = Uuid::new();
//! backend.insert_documents(vec![(id, Bson::Document(doc! { "name": "Alice" }))], "users").await?;
//! assert_eq!(backend.count_documents(None, "users").await?, 1);
//! ```

use async_trait::async_trait;
use bson::{Bson, Uuid};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Expr, Query},
};

/// Abstract interface for document storage backends.
///
/// Documents travel as `(id, body)` pairs on the way in. Documents coming back out
/// always carry their identifier under `_id`.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection, creating the collection if needed.
    ///
    /// # Errors
    ///
    /// Backends report an identifier that is already present as
    /// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists).
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces existing documents entirely.
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Deletes documents by identifier.
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()>;

    /// Retrieves documents by identifier. Unknown identifiers are omitted.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Runs a query: filter, then sort (natural order when no keys are given), then
    /// skip `offset` and take `limit`.
    ///
    /// `query.populate` is resolved above the backend and must be ignored here.
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Counts the documents matching `filter` (all documents when `None`).
    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection and every document in it.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Releases connections and other resources. No-op by default.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory for backends that need asynchronous setup (connections, handshakes).
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
