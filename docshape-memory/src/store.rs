//! In-memory storage implementation for document stores.
//!
//! Documents live in insertion-ordered maps behind an async-aware read-write lock, so
//! queries without sort keys return documents in the order they were inserted.

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument, Uuid};
use indexmap::IndexMap;
use mea::rwlock::RwLock;
use std::sync::Arc;
use tracing::{debug, instrument};

use docshape_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::evaluator::{DocumentEvaluator, compare_documents};

type CollectionMap = IndexMap<Uuid, BsonDocument>;
type StoreMap = IndexMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// Clones share the same underlying data, so one instance can be handed to several
/// stores or tasks. Queries scan the whole collection.
///
/// # Example
///
/// ```ignore
/// use docshape_memory::InMemoryStore;
/// use docshape::backend::StoreBackend;
/// use bson::{Uuid, Bson, doc};
///
/// let store = InMemoryStore::new();
/// let id = Uuid::new();
/// store.insert_documents(vec![(id, Bson::Document(doc! { "name": "Alice" }))], "users").await?;
///
/// let docs = store.get_documents(vec![id], "users").await?;
/// assert_eq!(docs.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

/// Stored documents always carry their identifier, whatever the caller sent.
fn into_stored(id: Uuid, document: Bson, collection: &str) -> DocumentStoreResult<BsonDocument> {
    match document {
        Bson::Document(mut doc) => {
            doc.insert(ID_FIELD, id);
            Ok(doc)
        }
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a document for {id} in {collection}, got {:?}",
            other.element_type()
        ))),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let mut staged = Vec::with_capacity(documents.len());

        for (id, doc) in documents {
            if collection_map.contains_key(&id) || staged.iter().any(|(staged_id, _)| *staged_id == id) {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
            }

            staged.push((id, into_stored(id, doc, collection)?));
        }

        collection_map.extend(staged);

        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn update_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .get_mut(collection)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;

        for (id, doc) in documents {
            let Some(slot) = collection_map.get_mut(&id) else {
                return Err(DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()));
            };

            *slot = into_stored(id, doc, collection)?;
        }

        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .get_mut(collection)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;

        for id in ids {
            // shift_remove keeps the remaining documents in insertion order
            if collection_map.shift_remove(&id).is_none() {
                return Err(DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()));
            }
        }

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| collection_map.get(id))
            .cloned()
            .map(Bson::Document)
            .collect())
    }

    #[instrument(skip(self, query))]
    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();

        for document in collection_map.values() {
            if DocumentEvaluator::matches(document, query.filter.as_ref())? {
                matched.push(document);
            }
        }

        if !query.sort.is_empty() {
            // stable, so ties keep insertion order
            matched.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let results = matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .map(Bson::Document)
            .collect::<Vec<_>>();

        debug!(returned = results.len(), "query evaluated");

        Ok(results)
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(0);
        };

        let mut count = 0_u64;

        for document in collection_map.values() {
            if DocumentEvaluator::matches(document, filter.as_ref())? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.shift_remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect())
    }
}

/// Builder for [`InMemoryStore`]; takes no options.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use docshape_core::query::{Filter, Sort};

    use super::*;

    async fn seeded(names: &[&str]) -> (InMemoryStore, Vec<Uuid>) {
        let store = InMemoryStore::new();
        let ids = names.iter().map(|_| Uuid::new()).collect::<Vec<_>>();

        store
            .insert_documents(
                ids.iter()
                    .zip(names)
                    .enumerate()
                    .map(|(rank, (id, name))| (*id, Bson::Document(doc! { "name": *name, "rank": rank as i32 })))
                    .collect(),
                "items",
            )
            .await
            .unwrap();

        (store, ids)
    }

    fn names(documents: &[Bson]) -> Vec<&str> {
        documents
            .iter()
            .filter_map(|doc| doc.as_document()?.get_str("name").ok())
            .collect()
    }

    #[tokio::test]
    async fn stored_documents_carry_their_identifier() {
        let (store, ids) = seeded(&["a"]).await;
        let docs = store.get_documents(ids.clone(), "items").await.unwrap();

        assert_eq!(docs[0].as_document().unwrap().get("_id"), Some(&Bson::from(ids[0])));
    }

    #[tokio::test]
    async fn natural_order_is_insertion_order() {
        let (store, _) = seeded(&["c", "a", "b"]).await;
        let docs = store.query_documents(Query::new(), "items").await.unwrap();

        assert_eq!(names(&docs), ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn delete_preserves_order_of_remaining_documents() {
        let (store, ids) = seeded(&["c", "a", "b", "d"]).await;
        store.delete_documents(vec![ids[1]], "items").await.unwrap();

        let docs = store.query_documents(Query::new(), "items").await.unwrap();
        assert_eq!(names(&docs), ["c", "b", "d"]);
    }

    #[tokio::test]
    async fn sorts_then_windows() {
        let (store, _) = seeded(&["c", "a", "e", "b", "d"]).await;
        let query = Query::builder()
            .sort_by("name:desc")
            .offset(1)
            .limit(2)
            .build();

        let docs = store.query_documents(query, "items").await.unwrap();
        assert_eq!(names(&docs), ["d", "c"]);
    }

    #[tokio::test]
    async fn equal_sort_keys_keep_insertion_order() {
        let store = InMemoryStore::new();
        let documents = [("x", 1), ("y", 0), ("z", 1)]
            .into_iter()
            .map(|(name, group)| (Uuid::new(), Bson::Document(doc! { "name": name, "group": group })))
            .collect();
        store.insert_documents(documents, "items").await.unwrap();

        let query = Query { sort: vec![Sort::asc("group")], ..Query::default() };
        let docs = store.query_documents(query, "items").await.unwrap();

        assert_eq!(names(&docs), ["y", "x", "z"]);
    }

    #[tokio::test]
    async fn sorting_tolerates_nan_keys() {
        let store = InMemoryStore::new();
        let documents = (0..64_i32)
            .map(|i| {
                let v = if i % 3 == 0 { f64::NAN } else { f64::from(i) };
                (Uuid::new(), Bson::Document(doc! { "name": i.to_string(), "v": v }))
            })
            .collect();
        store.insert_documents(documents, "items").await.unwrap();

        let query = Query { sort: vec![Sort::desc("v")], ..Query::default() };
        let docs = store.query_documents(query, "items").await.unwrap();

        assert_eq!(docs.len(), 64);
        let value = |doc: &Bson| doc.as_document().and_then(|doc| doc.get_f64("v").ok()).unwrap();
        assert_eq!(value(&docs[0]), 62.0);
        assert!(value(&docs[63]).is_nan());
    }

    #[tokio::test]
    async fn counts_respect_filters() {
        let (store, ids) = seeded(&["a", "b", "c"]).await;

        assert_eq!(store.count_documents(None, "items").await.unwrap(), 3);
        assert_eq!(store.count_documents(Some(Filter::gte("rank", 1)), "items").await.unwrap(), 2);
        assert_eq!(store.count_documents(Some(Filter::eq("_id", ids[2])), "items").await.unwrap(), 1);
        assert_eq!(store.count_documents(None, "missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_identifiers_are_rejected() {
        let (store, ids) = seeded(&["a"]).await;
        let result = store
            .insert_documents(vec![(ids[0], Bson::Document(doc! { "name": "again" }))], "items")
            .await;

        assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
        assert_eq!(store.count_documents(None, "items").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn updates_require_an_existing_document() {
        let (store, ids) = seeded(&["a"]).await;

        store
            .update_documents(vec![(ids[0], Bson::Document(doc! { "name": "renamed" }))], "items")
            .await
            .unwrap();
        let docs = store.get_documents(ids, "items").await.unwrap();
        assert_eq!(names(&docs), ["renamed"]);

        let missing = store
            .update_documents(vec![(Uuid::new(), Bson::Document(doc! {}))], "items")
            .await;
        assert!(matches!(missing, Err(DocumentStoreError::DocumentNotFound(_, _))));
    }

    #[tokio::test]
    async fn non_documents_are_invalid() {
        let store = InMemoryStore::new();
        let result = store
            .insert_documents(vec![(Uuid::new(), Bson::Int32(1))], "items")
            .await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn collections_can_be_listed_and_dropped() {
        let store = InMemoryStore::builder().build().await.unwrap();
        store.create_collection("a").await.unwrap();
        store.create_collection("b").await.unwrap();

        assert_eq!(store.list_collections().await.unwrap(), ["a", "b"]);

        store.drop_collection("a").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), ["b"]);
        assert!(store.drop_collection("a").await.is_err());
    }
}
