//! Collection handles for reading and writing documents.
//!
//! A [`Collection`] pairs a backend with the [`Schema`] of one collection. Writes go
//! through it so that stored documents always carry `_id` and `__v` (plus `createdAt` /
//! `updatedAt` when the schema enables timestamps); reads resolve populate directives
//! and can be redacted into their public form.
//!
//! [`TypedCollection`] wraps a collection and converts to and from a [`Document`] type.
//!
//! # Example
//!
//! ```ignore
//! use docshape::page::PageOptions;
//! use bson::doc;
//!
//! let projects = store.collection("projects");
//! let stored = projects.insert(doc! { "name": "Apollo" }).await?;
//!
//! let page = projects
//!     .paginate(None, &PageOptions::builder().sort_by("name").limit(5).build())
//!     .await?;
//! ```

use bson::{Bson, Document as BsonDocument, Uuid};
use serde_json::Value;
use std::{marker::PhantomData, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    backend::StoreBackend,
    document::{CREATED_AT_FIELD, Document, DocumentExt, ID_FIELD, UPDATED_AT_FIELD, VERSION_FIELD},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{self, PageOptions, PageResult},
    populate::Populator,
    query::{Expr, Query},
    redact::{Redactor, bson_to_json},
    schema::{Schema, SchemaRegistry},
};

/// Untyped handle to a collection.
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
    schema: Arc<Schema>,
    registry: &'a SchemaRegistry,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(backend: &'a B, schema: Arc<Schema>, registry: &'a SchemaRegistry) -> Self {
        Self {
            name: schema.collection().to_string(),
            backend,
            schema,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Inserts a single document and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the document carries an `_id`
    /// that is not a UUID, or the backend error if the identifier already exists.
    pub async fn insert(&self, document: BsonDocument) -> DocumentStoreResult<BsonDocument> {
        let mut stored = self.insert_many(vec![document]).await?;

        stored
            .pop()
            .ok_or_else(|| DocumentStoreError::Unknown("insert returned no document".to_string()))
    }

    /// Inserts documents in one backend call.
    ///
    /// A missing `_id` is generated, `__v` is reset to zero and, for schemas with
    /// timestamps, both `createdAt` and `updatedAt` are set to the current time.
    #[instrument(skip(self, documents), fields(collection = %self.name, count = documents.len()))]
    pub async fn insert_many(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<Vec<BsonDocument>> {
        let now = bson::DateTime::now();
        let mut stored = Vec::with_capacity(documents.len());

        for mut document in documents {
            let id = match document.get(ID_FIELD) {
                None | Some(Bson::Null) => {
                    let id = Uuid::new();
                    document.insert(ID_FIELD, id);
                    id
                }
                Some(value) => uuid_of(value)?,
            };

            document.insert(VERSION_FIELD, 0_i32);

            if self.schema.timestamps() {
                document.insert(CREATED_AT_FIELD, now);
                document.insert(UPDATED_AT_FIELD, now);
            }

            stored.push((id, document));
        }

        self.backend
            .insert_documents(
                stored
                    .iter()
                    .map(|(id, doc)| (*id, Bson::Document(doc.clone())))
                    .collect(),
                &self.name,
            )
            .await?;

        debug!("documents inserted");

        Ok(stored
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    /// Replaces a stored document and returns the new version.
    ///
    /// `createdAt` and `__v` are carried over from the stored copy when the replacement
    /// omits them; `updatedAt` is refreshed for schemas with timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if no document has the given `_id`.
    #[instrument(skip(self, document), fields(collection = %self.name))]
    pub async fn update(&self, mut document: BsonDocument) -> DocumentStoreResult<BsonDocument> {
        let id = match document.get(ID_FIELD) {
            Some(value) => uuid_of(value)?,
            None => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot update a document without {ID_FIELD} in {}",
                    self.name
                )));
            }
        };

        let current = self
            .get_one(id)
            .await?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(id.to_string(), self.name.clone()))?;

        for key in [VERSION_FIELD, CREATED_AT_FIELD] {
            if !document.contains_key(key) {
                if let Some(value) = current.get(key) {
                    document.insert(key, value.clone());
                }
            }
        }

        if self.schema.timestamps() {
            document.insert(UPDATED_AT_FIELD, bson::DateTime::now());
        }

        self.backend
            .update_documents(vec![(id, Bson::Document(document.clone()))], &self.name)
            .await?;

        Ok(document)
    }

    pub async fn delete(&self, ids: Vec<Uuid>) -> DocumentStoreResult<()> {
        self.backend
            .delete_documents(ids, &self.name)
            .await
    }

    /// Retrieves documents by identifier; unknown identifiers are omitted.
    pub async fn get(&self, ids: Vec<Uuid>) -> DocumentStoreResult<Vec<BsonDocument>> {
        Ok(into_documents(
            self.backend
                .get_documents(ids, &self.name)
                .await?,
        ))
    }

    pub async fn get_one(&self, id: Uuid) -> DocumentStoreResult<Option<BsonDocument>> {
        Ok(self.get(vec![id]).await?.into_iter().next())
    }

    /// Counts the documents matching `filter`.
    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(filter, &self.name)
            .await
    }

    /// Runs a query and resolves its populate directives.
    #[instrument(skip(self, query), fields(collection = %self.name))]
    pub async fn find(&self, mut query: Query) -> DocumentStoreResult<Vec<BsonDocument>> {
        let paths = std::mem::take(&mut query.populate);
        let mut documents = into_documents(
            self.backend
                .query_documents(query, &self.name)
                .await?,
        );

        if !paths.is_empty() {
            Populator::new(self.backend, self.registry)
                .populate(&self.schema, &mut documents, &paths)
                .await?;
        }

        debug!(found = documents.len(), "query complete");

        Ok(documents)
    }

    /// Returns the first document matching `filter`.
    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<BsonDocument>> {
        Ok(self
            .find(Query::builder().filter(filter).limit(1).build())
            .await?
            .into_iter()
            .next())
    }

    /// Fetches one page of documents. See [`page::paginate`].
    pub async fn paginate(
        &self,
        filter: Option<Expr>,
        options: &PageOptions,
    ) -> DocumentStoreResult<PageResult<BsonDocument>> {
        page::paginate(self, filter, options).await
    }

    /// Fetches one page and renders every result in its public JSON form.
    pub async fn paginate_public(
        &self,
        filter: Option<Expr>,
        options: &PageOptions,
    ) -> DocumentStoreResult<PageResult<Value>> {
        Ok(self
            .paginate(filter, options)
            .await?
            .map(|doc| self.to_public_json(&doc)))
    }

    /// Builds the public representation of a document from this collection.
    ///
    /// Populated relations are redacted with the schema of their own collection.
    pub fn to_public(&self, document: &BsonDocument) -> BsonDocument {
        Redactor::new(&self.schema)
            .with_registry(self.registry)
            .redact(document)
    }

    pub fn to_public_json(&self, document: &BsonDocument) -> Value {
        bson_to_json(&Bson::Document(self.to_public(document)))
    }
}

/// Handle to a collection of [`Document`] values.
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, D: Document> {
    inner: Collection<'a, B>,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend, D: Document> TypedCollection<'a, B, D> {
    pub(crate) fn new(inner: Collection<'a, B>) -> Self {
        Self { inner, _marker: PhantomData }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The untyped collection underneath.
    pub fn untyped(&self) -> &Collection<'a, B> {
        &self.inner
    }

    /// Inserts documents and returns them as stored.
    pub async fn insert(&self, documents: Vec<D>) -> DocumentStoreResult<Vec<D>> {
        let documents = documents
            .iter()
            .map(DocumentExt::to_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.inner
            .insert_many(documents)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn insert_one(&self, document: D) -> DocumentStoreResult<D> {
        from_document(self.inner.insert(document.to_document()?).await?)
    }

    pub async fn update(&self, document: D) -> DocumentStoreResult<D> {
        from_document(self.inner.update(document.to_document()?).await?)
    }

    pub async fn delete(&self, ids: Vec<Uuid>) -> DocumentStoreResult<()> {
        self.inner.delete(ids).await
    }

    pub async fn get(&self, ids: Vec<Uuid>) -> DocumentStoreResult<Vec<D>> {
        self.inner
            .get(ids)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn get_one(&self, id: Uuid) -> DocumentStoreResult<Option<D>> {
        self.inner
            .get_one(id)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.inner.count(filter).await
    }

    /// Runs a query. Populated relations must deserialize into `D`'s field types.
    pub async fn find(&self, query: Query) -> DocumentStoreResult<Vec<D>> {
        self.inner
            .find(query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<D>> {
        self.inner
            .find_one(filter)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn paginate(&self, filter: Option<Expr>, options: &PageOptions) -> DocumentStoreResult<PageResult<D>> {
        self.inner
            .paginate(filter, options)
            .await?
            .try_map(from_document)
    }

    pub async fn paginate_public(
        &self,
        filter: Option<Expr>,
        options: &PageOptions,
    ) -> DocumentStoreResult<PageResult<Value>> {
        self.inner.paginate_public(filter, options).await
    }

    /// Builds the public JSON form of `document`.
    pub fn to_public(&self, document: &D) -> DocumentStoreResult<Value> {
        Ok(self.inner.to_public_json(&document.to_document()?))
    }
}

fn uuid_of(value: &Bson) -> DocumentStoreResult<Uuid> {
    match value {
        Bson::Binary(binary) => binary
            .to_uuid()
            .map_err(|err| DocumentStoreError::InvalidDocument(format!("invalid {ID_FIELD}: {err}"))),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "{ID_FIELD} must be a UUID, got {:?}",
            other.element_type()
        ))),
    }
}

fn from_document<D: Document>(document: BsonDocument) -> DocumentStoreResult<D> {
    D::from_bson(Bson::Document(document))
}

fn into_documents(values: Vec<Bson>) -> Vec<BsonDocument> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Bson::Document(doc) => Some(doc),
            _ => None,
        })
        .collect()
}
