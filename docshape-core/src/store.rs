//! Document store entry point.
//!
//! A [`DocumentStore`] owns a backend and the [`SchemaRegistry`] shared by every
//! collection handle it hands out. Register schemas before use: population and
//! redaction of related documents look schemas up by collection name, and collections
//! without a registered schema behave as if every field were public.
//!
//! # Example
//!
//! ```ignore
//! use docshape::store::DocumentStore;
//! use docshape::schema::Schema;
//!
//! let mut store = DocumentStore::new(backend);
//! store.register(Schema::builder("tasks").reference("project", "projects").build());
//! store.register_document::<Project>();
//!
//! let projects = store.typed_collection::<Project>();
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::StoreBackend,
    collection::{Collection, TypedCollection},
    document::Document,
    error::DocumentStoreResult,
    schema::{Schema, SchemaRegistry},
};

/// A document store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    registry: SchemaRegistry,
}

impl<B: StoreBackend> DocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: SchemaRegistry::new(),
        }
    }

    /// Registers `schema` and returns the store, for chained construction.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.register(schema);
        self
    }

    /// Registers (or replaces) the schema of a collection.
    pub fn register(&mut self, schema: Schema) -> Arc<Schema> {
        debug!(collection = schema.collection(), "registering schema");
        self.registry.register(schema)
    }

    /// Registers the schema declared by a [`Document`] type.
    pub fn register_document<D: Document>(&mut self) -> Arc<Schema> {
        self.register(D::schema())
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets an untyped handle to the named collection.
    pub fn collection(&self, name: &str) -> Collection<'_, B> {
        Collection::new(&self.backend, self.registry.get_or_default(name), &self.registry)
    }

    /// Gets a typed handle to `D`'s collection.
    ///
    /// Uses the registered schema when there is one, otherwise [`Document::schema`].
    pub fn typed_collection<D: Document>(&self) -> TypedCollection<'_, B, D> {
        let schema = self
            .registry
            .get(D::collection_name())
            .unwrap_or_else(|| Arc::new(D::schema()));

        TypedCollection::new(Collection::new(&self.backend, schema, &self.registry))
    }

    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.create_collection(name).await
    }

    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts the backend down, consuming the store.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
