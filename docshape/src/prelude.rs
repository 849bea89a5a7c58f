//! Re-exports of the most used docshape types.
//!
//! ```ignore
//! use docshape::prelude::*;
//! ```

pub use docshape_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, TypedCollection},
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{PageOptions, PageResult, paginate},
    populate::PopulatePath,
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    redact::{Redactor, to_public},
    schema::{Relation, Schema, SchemaBuilder, SchemaRegistry},
    store::DocumentStore,
};

pub use crate::user::{Role, User, UserRepository};
