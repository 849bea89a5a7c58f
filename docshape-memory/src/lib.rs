//! In-memory document storage backend for docshape.
//!
//! [`InMemoryStore`] implements `StoreBackend` over insertion-ordered maps guarded by
//! an async-aware read-write lock. It supports the full query surface (dotted-path
//! filters, compound sorting, skip/limit windows and counting), which makes it the
//! backend of choice for tests and small deployments.
//!
//! # Quick Start
//!
//! ```ignore
//! use docshape::{page::PageOptions, store::DocumentStore, memory::InMemoryStore};
//! use bson::doc;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let projects = store.collection("projects");
//!
//! projects.insert(doc! { "name": "Apollo" }).await?;
//! let page = projects.paginate(None, &PageOptions::default()).await?;
//! assert_eq!(page.total_results(), 1);
//! ```

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
