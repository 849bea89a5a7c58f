//! Public representations of stored documents.
//!
//! [`to_public`] is applied whenever a document crosses the serialization boundary. It
//! returns a new document (the source is never mutated) built in this order:
//!
//! 1. every key whose dotted path the schema marks private is dropped, at any depth,
//!    including inside arrays of sub-documents;
//! 2. `_id` is replaced by a string `id`, and `__v`, `createdAt` and `updatedAt` are
//!    removed, at the root and on any nested document that carries its own `_id`;
//! 3. the schema's custom transform, if any, runs last.
//!
//! Redaction never fails and is idempotent on shape: redacting an already public
//! document yields the same document.

use bson::{Bson, Document as BsonDocument};
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};

use crate::{
    document::{CREATED_AT_FIELD, ID_FIELD, PUBLIC_ID_FIELD, UPDATED_AT_FIELD, VERSION_FIELD, id_string},
    schema::{Schema, SchemaRegistry},
};

/// Builds the public representation of `document` using `schema`.
pub fn to_public(document: &BsonDocument, schema: &Schema) -> BsonDocument {
    Redactor::new(schema).redact(document)
}

/// Builds the public representation of `document` and renders it as JSON.
pub fn to_public_json(document: &BsonDocument, schema: &Schema) -> Value {
    bson_to_json(&Bson::Document(to_public(document, schema)))
}

/// Walks a document tree applying one schema's redaction rules.
///
/// With a registry attached, populated relations are redacted with the schema of the
/// collection they were fetched from (transform included) instead of the parent's.
#[derive(Debug, Clone, Copy)]
pub struct Redactor<'a> {
    schema: &'a Schema,
    registry: Option<&'a SchemaRegistry>,
}

impl<'a> Redactor<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema, registry: None }
    }

    /// Redacts populated relations with their own collection's schema.
    pub fn with_registry(mut self, registry: &'a SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Produces the public representation of `document`.
    pub fn redact(&self, document: &BsonDocument) -> BsonDocument {
        let mut output = self.strip_document(document, "");

        replace_identity(&mut output);

        if let Some(transform) = self.schema.transform() {
            transform(document, &mut output);
        }

        output
    }

    fn strip_document(&self, document: &BsonDocument, prefix: &str) -> BsonDocument {
        let mut output = BsonDocument::new();

        for (key, value) in document {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            if self.schema.is_private(&path) {
                continue;
            }

            let related = match (prefix.is_empty(), self.registry) {
                (true, Some(registry)) => self
                    .schema
                    .relation(key)
                    .map(|relation| registry.get_or_default(relation.collection())),
                _ => None,
            };

            let value = match related {
                Some(schema) => Redactor { schema: &schema, registry: self.registry }.redact_related(value),
                None => self.strip_value(value, &path),
            };

            output.insert(key.clone(), value);
        }

        output
    }

    fn strip_value(&self, value: &Bson, path: &str) -> Bson {
        match value {
            Bson::Document(doc) => {
                let mut nested = self.strip_document(doc, path);

                if nested.contains_key(ID_FIELD) {
                    replace_identity(&mut nested);
                }

                Bson::Document(nested)
            }
            Bson::Array(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| self.strip_value(item, path))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    // Unpopulated identifiers pass through untouched.
    fn redact_related(&self, value: &Bson) -> Bson {
        match value {
            Bson::Document(doc) => Bson::Document(self.redact(doc)),
            Bson::Array(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| self.redact_related(item))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn replace_identity(output: &mut BsonDocument) {
    if let Some(id) = output.remove(ID_FIELD) {
        output.insert(PUBLIC_ID_FIELD, id_string(&id));
    }

    for key in [VERSION_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD] {
        output.remove(key);
    }
}

/// Renders a BSON value as plain JSON.
///
/// Identifiers become strings (as in [`id_string`]), dates become RFC 3339 UTC strings with
/// millisecond precision and
/// any other non-JSON type falls back to its display form.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(value) => Value::Bool(*value),
        Bson::Int32(value) => Value::from(*value),
        Bson::Int64(value) => Value::from(*value),
        Bson::Double(value) => Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(value) => Value::String(value.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(
            doc.iter()
                .map(|(k, v)| (k.clone(), bson_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Bson::ObjectId(_) | Bson::Binary(_) => Value::String(id_string(value)),
        Bson::DateTime(value) => Value::String(value.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use bson::{Uuid, doc};
    use serde_json::json;

    use super::*;

    fn schema_with_private() -> Schema {
        Schema::builder("models")
            .public("public")
            .private("private")
            .build()
    }

    #[test]
    fn replaces_id_with_string_id() {
        let id = Uuid::new();
        let output = to_public(&doc! { "_id": id, "name": "x" }, &Schema::new("models"));

        assert!(!output.contains_key("_id"));
        assert_eq!(output.get_str("id").unwrap(), id.to_string());
    }

    #[test]
    fn removes_version_and_timestamps() {
        let output = to_public(
            &doc! {
                "_id": Uuid::new(),
                "__v": 0,
                "createdAt": bson::DateTime::now(),
                "updatedAt": bson::DateTime::now(),
            },
            &Schema::builder("models").timestamps(true).build(),
        );

        assert!(!output.contains_key("__v"));
        assert!(!output.contains_key("createdAt"));
        assert!(!output.contains_key("updatedAt"));
    }

    #[test]
    fn empty_document_only_keeps_id() {
        let id = Uuid::new();
        let output = to_public(&doc! { "_id": id, "__v": 0 }, &Schema::new("models"));

        assert_eq!(output, doc! { "id": id.to_string() });
    }

    #[test]
    fn removes_private_paths() {
        let output = to_public(
            &doc! { "_id": Uuid::new(), "public": "some public value", "private": "some private value" },
            &schema_with_private(),
        );

        assert!(output.contains_key("public"));
        assert!(!output.contains_key("private"));
    }

    #[test]
    fn removes_multiple_private_paths() {
        let schema = Schema::builder("models")
            .public("public")
            .private("privateOne")
            .private("privateTwo")
            .build();
        let output = to_public(
            &doc! { "_id": Uuid::new(), "public": "visible", "privateOne": "hidden", "privateTwo": "also hidden" },
            &schema,
        );

        assert_eq!(output.get_str("public").unwrap(), "visible");
        assert!(!output.contains_key("privateOne"));
        assert!(!output.contains_key("privateTwo"));
    }

    #[test]
    fn removes_deeply_nested_private_paths() {
        let schema = Schema::builder("models")
            .public("public")
            .private("nested.private")
            .private("nested.deeply.veryDeeply.private")
            .build();
        let output = to_public(
            &doc! {
                "_id": Uuid::new(),
                "public": "some public value",
                "nested": {
                    "private": "some nested private value",
                    "kept": 1,
                    "deeply": { "veryDeeply": { "private": "should not be visible", "other": true } },
                },
            },
            &schema,
        );

        let nested = output.get_document("nested").unwrap();
        assert!(!nested.contains_key("private"));
        assert_eq!(nested.get_i32("kept").unwrap(), 1);

        let very_deeply = nested
            .get_document("deeply")
            .and_then(|d| d.get_document("veryDeeply"))
            .unwrap();
        assert!(!very_deeply.contains_key("private"));
        assert!(very_deeply.get_bool("other").unwrap());
        assert!(output.contains_key("public"));
    }

    #[test]
    fn removes_private_paths_inside_arrays() {
        let schema = Schema::builder("models").private("items.secret").build();
        let output = to_public(
            &doc! {
                "_id": Uuid::new(),
                "items": [ { "name": "a", "secret": 1 }, { "name": "b", "secret": 2 } ],
            },
            &schema,
        );

        for item in output.get_array("items").unwrap() {
            let item = item.as_document().unwrap();
            assert!(item.contains_key("name"));
            assert!(!item.contains_key("secret"));
        }
    }

    #[test]
    fn nested_entities_get_public_ids() {
        let child = Uuid::new();
        let output = to_public(
            &doc! { "_id": Uuid::new(), "children": [ { "_id": child, "__v": 0, "name": "c" } ] },
            &Schema::new("models"),
        );

        let item = output.get_array("children").unwrap()[0].as_document().unwrap().clone();
        assert_eq!(item, doc! { "name": "c", "id": child.to_string() });
    }

    #[test]
    fn nested_plain_objects_keep_timestamp_like_keys() {
        let output = to_public(
            &doc! { "_id": Uuid::new(), "audit": { "createdAt": "yesterday" } },
            &Schema::new("models"),
        );

        assert_eq!(output.get_document("audit").unwrap().get_str("createdAt").unwrap(), "yesterday");
    }

    #[test]
    fn custom_transform_runs_after_builtin_redaction() {
        let schema = Schema::builder("models")
            .public("public")
            .public("x")
            .transform(|source, ret| {
                ret.remove("x");
                assert!(source.contains_key("_id"));
                assert!(!ret.contains_key("_id"));
                ret.insert("seen", true);
            })
            .build();
        let source = doc! { "_id": Uuid::new(), "public": "p", "x": "gone" };
        let output = to_public(&source, &schema);

        assert!(!output.contains_key("x"));
        assert!(output.contains_key("public"));
        assert!(output.get_bool("seen").unwrap());
        assert!(source.contains_key("x"));
    }

    #[test]
    fn provided_identifier_is_renamed_like_generated_one() {
        let output = to_public(&doc! { "_id": "my-own-id" }, &Schema::new("models"));

        assert_eq!(output, doc! { "id": "my-own-id" });
    }

    #[test]
    fn redaction_is_idempotent() {
        let schema = Schema::builder("models")
            .private("private")
            .private("nested.private")
            .build();
        let once = to_public(
            &doc! { "_id": Uuid::new(), "__v": 1, "private": 1, "nested": { "private": 2, "public": 3 } },
            &schema,
        );
        let twice = to_public(&once, &schema);

        assert_eq!(once, twice);
    }

    #[test]
    fn registry_redacts_populated_relations_with_their_schema() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::builder("users").private("password").build());
        let tasks = Schema::builder("tasks").reference("owner", "users").build();

        let owner = Uuid::new();
        let output = Redactor::new(&tasks)
            .with_registry(&registry)
            .redact(&doc! {
                "_id": Uuid::new(),
                "owner": { "_id": owner, "name": "n", "password": "hash" },
            });

        assert_eq!(output.get_document("owner").unwrap(), &doc! { "name": "n", "id": owner.to_string() });
    }

    #[test]
    fn public_json_renders_identifiers_as_strings() {
        let id = Uuid::new();
        let reference = Uuid::new();
        let json = to_public_json(
            &doc! { "_id": id, "project": reference, "count": 2, "ratio": 0.5, "tags": ["a"] },
            &Schema::new("tasks"),
        );

        assert_eq!(
            json,
            json!({
                "project": reference.to_string(),
                "count": 2,
                "ratio": 0.5,
                "tags": ["a"],
                "id": id.to_string(),
            })
        );
    }

    #[test]
    fn dates_render_as_utc_strings() {
        let date = bson::DateTime::from_millis(0);

        assert_eq!(bson_to_json(&Bson::DateTime(date)), json!("1970-01-01T00:00:00.000Z"));
    }
}
