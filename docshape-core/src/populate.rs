//! Relation population.
//!
//! A populate directive is a dotted relation path: `tasks.project` populates the
//! `tasks` relation of each document, then the `project` relation of every populated
//! task, resolving each level with the schema registered for the related collection.
//! Unknown relations are skipped, never an error.
//!
//! Every level issues one query per relation, regardless of how many parent documents
//! are involved. Directives run one after another; a relation already populated by an
//! earlier directive (`a.b,a.c`) is reused in place instead of being fetched again.

use bson::{Bson, Document as BsonDocument};
use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::{
    backend::StoreBackend,
    document::{ID_FIELD, get_path, id_string},
    error::DocumentStoreResult,
    query::{Filter, Query},
    schema::{Relation, Schema, SchemaRegistry},
};

/// A single populate directive, e.g. `tasks.project`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulatePath {
    segments: Vec<String>,
}

impl PopulatePath {
    /// Parses a dotted relation path. Returns `None` for a blank path.
    pub fn parse(path: &str) -> Option<Self> {
        let segments = path
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        (!segments.is_empty()).then_some(Self { segments })
    }

    /// Parses a comma-separated list of relation paths, skipping blank entries.
    pub fn parse_list(spec: &str) -> Vec<Self> {
        spec.split(',')
            .filter_map(Self::parse)
            .collect()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Resolves populate directives against a backend.
#[derive(Debug)]
pub struct Populator<'a, B: StoreBackend> {
    backend: &'a B,
    registry: &'a SchemaRegistry,
}

impl<'a, B: StoreBackend> Populator<'a, B> {
    pub fn new(backend: &'a B, registry: &'a SchemaRegistry) -> Self {
        Self { backend, registry }
    }

    /// Applies every directive in `paths` to `documents`, which belong to `schema`'s
    /// collection.
    ///
    /// # Errors
    ///
    /// Propagates backend errors unchanged.
    pub async fn populate(
        &self,
        schema: &Schema,
        documents: &mut [BsonDocument],
        paths: &[PopulatePath],
    ) -> DocumentStoreResult<()> {
        for path in paths {
            self.populate_level(schema, documents.iter_mut().collect(), path.segments())
                .await?;
        }

        Ok(())
    }

    fn populate_level<'f>(
        &'f self,
        schema: &'f Schema,
        documents: Vec<&'f mut BsonDocument>,
        segments: &'f [String],
    ) -> BoxFuture<'f, DocumentStoreResult<()>> {
        async move {
            let Some((head, rest)) = segments.split_first() else {
                return Ok(());
            };

            if documents.is_empty() {
                return Ok(());
            }

            let Some(relation) = schema.relation(head) else {
                debug!(collection = schema.collection(), relation = %head, "unknown relation, nothing to populate");
                return Ok(());
            };
            let target = self.registry.get_or_default(relation.collection());

            match relation {
                Relation::Ref { field, collection } => {
                    self.populate_ref(documents, field, collection, &target, rest)
                        .await
                }
                Relation::Virtual { name, collection, local_field, foreign_field, just_one } => {
                    self.populate_virtual(
                        documents,
                        VirtualSpec { name, collection, local_field, foreign_field, just_one: *just_one },
                        &target,
                        rest,
                    )
                    .await
                }
            }
        }
        .boxed()
    }

    async fn populate_ref(
        &self,
        mut documents: Vec<&mut BsonDocument>,
        field: &str,
        collection: &str,
        target: &Schema,
        rest: &[String],
    ) -> DocumentStoreResult<()> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for document in &documents {
            let values = match document.get(field) {
                Some(Bson::Array(items)) => items.iter().collect::<Vec<_>>(),
                Some(value) => vec![value],
                None => Vec::new(),
            };

            for value in values {
                if !matches!(value, Bson::Document(_) | Bson::Null) && seen.insert(id_string(value)) {
                    pending.push(value.clone());
                }
            }
        }

        let fetched = self
            .fetch(collection, ID_FIELD, pending)
            .await?
            .into_iter()
            .filter_map(|doc| doc.get(ID_FIELD).map(id_string).map(|id| (id, doc)))
            .collect::<HashMap<_, _>>();

        for document in documents.iter_mut() {
            let Some(value) = document.get_mut(field) else {
                continue;
            };

            *value = match std::mem::replace(value, Bson::Null) {
                Bson::Array(items) => Bson::Array(
                    items
                        .into_iter()
                        .filter_map(|item| resolve_reference(item, &fetched, collection))
                        .collect(),
                ),
                single => resolve_reference(single, &fetched, collection).unwrap_or(Bson::Null),
            };
        }

        if !rest.is_empty() {
            let children = documents
                .iter_mut()
                .flat_map(|document| embedded_documents(document, field))
                .collect::<Vec<_>>();

            self.populate_level(target, children, rest).await?;
        }

        Ok(())
    }

    async fn populate_virtual(
        &self,
        mut documents: Vec<&mut BsonDocument>,
        spec: VirtualSpec<'_>,
        target: &Schema,
        rest: &[String],
    ) -> DocumentStoreResult<()> {
        let mut seen = HashSet::new();
        let mut locals = Vec::new();

        for document in documents.iter().filter(|doc| !doc.contains_key(spec.name)) {
            for value in flatten(get_path(document, spec.local_field)) {
                if seen.insert(id_string(value)) {
                    locals.push(value.clone());
                }
            }
        }

        if !locals.is_empty() {
            let mut groups: HashMap<String, Vec<BsonDocument>> = HashMap::new();

            for related in self.fetch(spec.collection, spec.foreign_field, locals).await? {
                let keys = flatten(get_path(&related, spec.foreign_field))
                    .into_iter()
                    .map(id_string)
                    .collect::<HashSet<_>>();

                for key in keys {
                    groups
                        .entry(key)
                        .or_default()
                        .push(related.clone());
                }
            }

            for document in documents.iter_mut().filter(|doc| !doc.contains_key(spec.name)) {
                let mut attached = HashSet::new();
                let matches = flatten(get_path(document, spec.local_field))
                    .into_iter()
                    .filter_map(|value| groups.get(&id_string(value)))
                    .flatten()
                    .filter(|related| attached.insert(related.get(ID_FIELD).map(id_string)))
                    .cloned()
                    .collect::<Vec<_>>();

                let value = if spec.just_one {
                    matches
                        .into_iter()
                        .next()
                        .map(Bson::Document)
                        .unwrap_or(Bson::Null)
                } else {
                    Bson::Array(matches.into_iter().map(Bson::Document).collect())
                };

                document.insert(spec.name, value);
            }
        }

        if !rest.is_empty() {
            let children = documents
                .iter_mut()
                .flat_map(|document| embedded_documents(document, spec.name))
                .collect::<Vec<_>>();

            self.populate_level(target, children, rest).await?;
        }

        Ok(())
    }

    async fn fetch(&self, collection: &str, field: &str, values: Vec<Bson>) -> DocumentStoreResult<Vec<BsonDocument>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        debug!(collection, field, count = values.len(), "fetching related documents");

        Ok(self
            .backend
            .query_documents(
                Query::builder()
                    .filter(Filter::any_of(field, Bson::Array(values)))
                    .build(),
                collection,
            )
            .await?
            .into_iter()
            .filter_map(|bson| match bson {
                Bson::Document(doc) => Some(doc),
                _ => None,
            })
            .collect())
    }
}

struct VirtualSpec<'r> {
    name: &'r str,
    collection: &'r str,
    local_field: &'r str,
    foreign_field: &'r str,
    just_one: bool,
}

fn resolve_reference(value: Bson, fetched: &HashMap<String, BsonDocument>, collection: &str) -> Option<Bson> {
    match value {
        Bson::Document(_) => Some(value),
        Bson::Null => None,
        reference => {
            let id = id_string(&reference);
            let resolved = fetched.get(&id).cloned().map(Bson::Document);

            if resolved.is_none() {
                warn!(collection, id = %id, "referenced document not found");
            }

            resolved
        }
    }
}

fn flatten(value: Option<&Bson>) -> Vec<&Bson> {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .filter(|item| !matches!(item, Bson::Null))
            .collect(),
        Some(Bson::Null) | None => Vec::new(),
        Some(value) => vec![value],
    }
}

fn embedded_documents<'d>(document: &'d mut BsonDocument, key: &str) -> Vec<&'d mut BsonDocument> {
    match document.get_mut(key) {
        Some(Bson::Document(doc)) => vec![doc],
        Some(Bson::Array(items)) => items
            .iter_mut()
            .filter_map(Bson::as_document_mut)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_paths() {
        let path = PopulatePath::parse("tasks.project").unwrap();

        assert_eq!(path.segments(), ["tasks".to_string(), "project".to_string()]);
        assert!(PopulatePath::parse(" ").is_none());
        assert!(PopulatePath::parse("..").is_none());
    }

    #[test]
    fn shared_prefixes_stay_independent_directives() {
        let paths = PopulatePath::parse_list("a.b, a.c,,project");

        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0].segments(), ["a".to_string(), "b".to_string()]);
        assert_eq!(paths[1].segments(), ["a".to_string(), "c".to_string()]);
        assert_eq!(paths[2].segments(), ["project".to_string()]);
    }

    #[test]
    fn flatten_skips_nulls() {
        let array = Bson::Array(vec![Bson::Int32(1), Bson::Null, Bson::Int32(2)]);

        assert_eq!(flatten(Some(&array)).len(), 2);
        assert!(flatten(Some(&Bson::Null)).is_empty());
        assert!(flatten(None).is_empty());
        assert_eq!(flatten(Some(&Bson::Int32(3))), vec![&Bson::Int32(3)]);
    }

    #[test]
    fn embedded_documents_reach_single_and_array_values() {
        let mut document = bson::doc! {
            "one": { "a": 1 },
            "many": [ { "a": 1 }, 2, { "a": 3 } ],
            "raw": 4,
        };

        assert_eq!(embedded_documents(&mut document, "one").len(), 1);
        assert_eq!(embedded_documents(&mut document, "many").len(), 2);
        assert!(embedded_documents(&mut document, "raw").is_empty());
        assert!(embedded_documents(&mut document, "missing").is_empty());
    }
}
