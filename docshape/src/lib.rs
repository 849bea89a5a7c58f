//! Pagination and public serialization behaviours for JSON document collections.
//!
//! This crate is the primary entry point for users of docshape. It re-exports the core
//! types from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Paging** - `paginate` with `sortBy`, `populate`, `limit` and `page` options, run as
//!   a concurrent count and windowed fetch
//! - **Public representations** - `_id` becomes `id`, internal and private fields are
//!   removed at any depth, and a custom transform runs last
//! - **Population** - referenced and virtual relations, nested with dotted paths
//! - **Multiple backends** - in-memory and MongoDB behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docshape::{prelude::*, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new())
//!     .with_schema(Schema::builder("tasks").reference("project", "projects").build());
//!
//! let projects = store.collection("projects");
//! let project = projects.insert(bson::doc! { "name": "Apollo" }).await?;
//! store
//!     .collection("tasks")
//!     .insert(bson::doc! { "name": "Launch", "project": project.get("_id").cloned() })
//!     .await?;
//!
//! let page = store
//!     .collection("tasks")
//!     .paginate_public(None, &PageOptions::builder().populate("project").build())
//!     .await?;
//!
//! assert_eq!(page.results()[0]["project"]["name"], "Apollo");
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;
pub mod user;

pub use docshape_core::{backend, collection, document, error, page, populate, query, redact, schema, store};

pub use bson;

/// In-memory storage backend.
pub mod memory {
    pub use docshape_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docshape_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
