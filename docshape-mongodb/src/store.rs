use async_trait::async_trait;
use bson::{Bson, Document, Uuid, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions},
};
use tracing::{debug, instrument};

use docshape_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{ID_FIELD, id_string},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::{
    query::{MongoQueryTranslator, sort_document},
    sanitizer::ValueSanitizer,
};

/// MongoDB storage backend.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&ValueSanitizer::sanitize_string(collection_name))
    }

    fn prepare_document(&self, id: &Uuid, document: &Bson) -> DocumentStoreResult<Document> {
        let mut prepared = ValueSanitizer::sanitize_value(document)
            .as_document()
            .cloned()
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("expected a document for {id}")))?;

        prepared.insert(ID_FIELD, *id);

        Ok(prepared)
    }

    fn restore_document(&self, document: Document) -> Bson {
        ValueSanitizer::restore_value(&Bson::Document(document))
    }

    async fn collect(&self, cursor: mongodb::Cursor<Document>) -> DocumentStoreResult<Vec<Bson>> {
        Ok(cursor
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(|doc| self.restore_document(doc))
            .collect())
    }
}

fn backend_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let target = self.get_collection(collection);
        let ids = documents.iter().map(|(id, _)| *id).collect::<Vec<_>>();

        if let Some(existing) = target
            .find_one(doc! { ID_FIELD: { "$in": ids } })
            .await
            .map_err(backend_error)?
        {
            let id = existing
                .get(ID_FIELD)
                .map(id_string)
                .unwrap_or_default();

            return Err(DocumentStoreError::DocumentAlreadyExists(id, collection.to_string()));
        }

        target
            .insert_many(
                documents
                    .iter()
                    .map(|(id, doc)| self.prepare_document(id, doc))
                    .collect::<DocumentStoreResult<Vec<Document>>>()?,
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn update_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let target = self.get_collection(collection);

        for (id, document) in documents {
            let result = target
                .replace_one(doc! { ID_FIELD: id }, self.prepare_document(&id, &document)?)
                .await
                .map_err(backend_error)?;

            if result.matched_count == 0 {
                return Err(DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()));
            }
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .delete_many(doc! { ID_FIELD: { "$in": ids } })
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let cursor = self
            .get_collection(collection)
            .find(doc! { ID_FIELD: { "$in": ids } })
            .await
            .map_err(backend_error)?;

        self.collect(cursor).await
    }

    #[instrument(skip(self, query))]
    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let filter = MongoQueryTranslator::translate(query.filter.as_ref())?;
        let mut options = FindOptions::default();

        options.limit = query.limit.and_then(|limit| i64::try_from(limit).ok());
        options.skip = query.offset.map(|skip| skip as u64);
        options.sort = sort_document(&query.sort);

        debug!(?filter, sort = ?options.sort, "querying");

        let cursor = self
            .get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?;

        self.collect(cursor).await
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .create_collection(&ValueSanitizer::sanitize_string(name))
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?
            .iter()
            .map(|name| ValueSanitizer::restore_string(name))
            .collect())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Builder connecting a [`MongoDbStore`] from a connection string.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        debug!(database = %self.database, "connected to mongodb");

        Ok(MongoDbStore::new(client, self.database))
    }
}
