//! Core traits and helpers for document representation.
//!
//! Stored documents are plain [`bson::Document`] trees whose identifier lives under the
//! `_id` key. Typed documents implement [`Document`] and get conversion helpers (BSON,
//! JSON, public JSON) through the blanket [`DocumentExt`] implementation.

use bson::{Bson, Document as BsonDocument, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    redact,
    schema::Schema,
};

/// Key holding a document's unique identifier.
pub const ID_FIELD: &str = "_id";
/// Key holding the public form of the identifier.
pub const PUBLIC_ID_FIELD: &str = "id";
/// Internal revision marker set on insert.
pub const VERSION_FIELD: &str = "__v";
/// Creation timestamp managed by schemas with timestamps enabled.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Update timestamp managed by schemas with timestamps enabled.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Core trait that all typed documents stored in a document store must implement.
///
/// The identifier is expected to serialize under `_id`, so implementors usually
/// annotate the field with `#[serde(rename = "_id")]`.
///
/// # Example
///
/// ```ignore
/// use docshape::document::Document;
/// use docshape::schema::Schema;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Project {
///     #[serde(rename = "_id")]
///     pub id: Uuid,
///     pub name: String,
/// }
///
/// impl Document for Project {
///     fn id(&self) -> &Uuid {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "projects"
///     }
///
///     fn schema() -> Schema {
///         Schema::builder(Self::collection_name())
///             .virtual_relation("tasks", "tasks", "_id", "project")
///             .build()
///     }
/// }
/// ```
pub trait Document: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns a reference to this document's unique identifier.
    fn id(&self) -> &Uuid;

    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;

    /// Returns the schema describing private fields, relations and transforms.
    ///
    /// Defaults to an empty schema: every field public, no relations.
    fn schema() -> Schema {
        Schema::new(Self::collection_name())
    }
}

/// Extension trait providing conversion utilities for documents.
///
/// Automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a BSON value for storage.
    fn to_bson(&self) -> DocumentStoreResult<Bson>;

    /// Converts this document to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the type does not serialize to a map.
    fn to_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a document from a BSON value.
    fn from_bson(bson: Bson) -> DocumentStoreResult<Self>;

    /// Converts this document to a JSON value, internal fields included.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a document from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;

    /// Converts this document to its public JSON representation using [`Document::schema`].
    fn to_public(&self) -> DocumentStoreResult<Value>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson(&self) -> DocumentStoreResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn to_document(&self) -> DocumentStoreResult<BsonDocument> {
        match self.to_bson()? {
            Bson::Document(doc) => Ok(doc),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a document for collection {}, got {:?}",
                Self::collection_name(),
                other.element_type(),
            ))),
        }
    }

    fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }

    fn to_public(&self) -> DocumentStoreResult<Value> {
        Ok(redact::to_public_json(&self.to_document()?, &Self::schema()))
    }
}

/// Looks up a dotted path (`a.b.c`) inside a document.
pub fn get_path<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Renders an identifier value as the string used in public representations.
///
/// UUIDs render in their hyphenated form, ObjectIds as hex and strings as-is. A
/// nested document renders as the string form of its own `_id`, which lets populated
/// references be compared against raw identifiers.
pub fn id_string(value: &Bson) -> String {
    match value {
        Bson::String(value) => value.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Binary(binary) => binary
            .to_uuid()
            .map(|uuid| uuid.to_string())
            .unwrap_or_else(|_| value.to_string()),
        Bson::Document(doc) => doc
            .get(ID_FIELD)
            .map(id_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;

    #[test]
    fn get_path_walks_nested_documents() {
        let document = doc! { "a": { "b": { "c": 1 } }, "d": "x" };

        assert_eq!(get_path(&document, "a.b.c"), Some(&Bson::Int32(1)));
        assert_eq!(get_path(&document, "d"), Some(&Bson::String("x".into())));
        assert_eq!(get_path(&document, "a.x"), None);
        assert_eq!(get_path(&document, "d.e"), None);
    }

    #[test]
    fn id_string_renders_identifier_kinds() {
        let uuid = Uuid::new();
        let oid = ObjectId::new();

        assert_eq!(id_string(&Bson::from(uuid)), uuid.to_string());
        assert_eq!(id_string(&Bson::ObjectId(oid)), oid.to_hex());
        assert_eq!(id_string(&Bson::String("abc".into())), "abc");
        assert_eq!(id_string(&Bson::Document(doc! { "_id": "abc", "name": "x" })), "abc");
    }
}
