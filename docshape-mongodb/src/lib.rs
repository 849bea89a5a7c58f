//! MongoDB backend implementation for docshape.
//!
//! Filters are translated into MongoDB query documents, compound sort keys into a sort
//! document and pagination windows into `skip`/`limit`, so counting and windowing run
//! on the server.
//!
//! Enable it through the `mongodb` feature of the facade crate:
//!
//! ```toml
//! [dependencies]
//! docshape = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docshape::{backend::StoreBackendBuilder, mongodb::MongoDbStore, store::DocumentStore};
//!
//! let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!     .build()
//!     .await?;
//! let store = DocumentStore::new(backend);
//! ```

pub mod query;
pub mod sanitizer;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
