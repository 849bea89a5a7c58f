//! Pagination and public serialization behaviours for JSON document schemas.
//!
//! This crate is the core of the docshape project and provides:
//!
//! - **Paging** ([`page`]) - `paginate` with sorting, population and page metadata
//! - **Redaction** ([`redact`]) - public representations without private or internal fields
//! - **Population** ([`populate`]) - resolving referenced and virtual relations
//! - **Schemas** ([`schema`]) - private fields, relations, timestamps and transforms
//! - **Store backend abstraction** ([`backend`]) - the seam storage engines implement
//! - **Queries** ([`query`]) - filter expressions and sort keys
//! - **Collections and stores** ([`collection`], [`store`]) - the high-level API
//! - **Errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docshape::{page::PageOptions, schema::Schema, store::DocumentStore};
//!
//! let store = DocumentStore::new(backend)
//!     .with_schema(Schema::builder("tasks").reference("project", "projects").build());
//!
//! let page = store
//!     .collection("tasks")
//!     .paginate_public(None, &PageOptions::builder().populate("project").build())
//!     .await?;
//! ```

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod page;
pub mod populate;
pub mod query;
pub mod redact;
pub mod schema;
pub mod store;
