//! Declarative schema descriptors.
//!
//! A [`Schema`] carries the metadata the pagination and redaction behaviours need:
//! which field paths are private, which relations can be populated, whether the
//! collection manages timestamps, an optional custom public transform and the default
//! page size. Schemas are registered in a [`SchemaRegistry`] so that population can
//! resolve the schema of a related collection by name.
//!
//! # Example
//!
//! ```ignore
//! use docshape::schema::Schema;
//!
//! let tasks = Schema::builder("tasks")
//!     .reference("project", "projects")
//!     .private("internalNotes")
//!     .timestamps(true)
//!     .build();
//! ```

use bson::Document as BsonDocument;
use std::{collections::{HashMap, HashSet}, fmt, sync::Arc};

/// Page size used when neither the caller nor the schema provides one.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Caller-supplied transform applied last when building a public representation.
///
/// Receives the untouched source document and the output being built.
pub type Transform = Arc<dyn Fn(&BsonDocument, &mut BsonDocument) + Send + Sync>;

/// Per-field metadata declared on a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted path of the field, relative to the document root.
    pub path: String,
    /// Whether the field is excluded from every public representation.
    pub private: bool,
}

/// A relation that can be populated when fetching documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// The local `field` holds one identifier, or an array of identifiers, of
    /// documents in `collection`.
    Ref {
        field: String,
        collection: String,
    },
    /// Documents in `collection` whose `foreign_field` matches this document's
    /// `local_field`, exposed under `name`.
    Virtual {
        name: String,
        collection: String,
        local_field: String,
        foreign_field: String,
        just_one: bool,
    },
}

impl Relation {
    /// The key the populated value is stored under.
    pub fn name(&self) -> &str {
        match self {
            Relation::Ref { field, .. } => field,
            Relation::Virtual { name, .. } => name,
        }
    }

    /// The collection holding the related documents.
    pub fn collection(&self) -> &str {
        match self {
            Relation::Ref { collection, .. } | Relation::Virtual { collection, .. } => collection,
        }
    }
}

/// Schema descriptor for a collection.
#[derive(Clone)]
pub struct Schema {
    collection: String,
    fields: Vec<FieldSpec>,
    private_paths: HashSet<String>,
    relations: Vec<Relation>,
    timestamps: bool,
    transform: Option<Transform>,
    default_limit: usize,
}

impl Schema {
    /// Creates an empty schema: no private fields, no relations, no transform.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: Vec::new(),
            private_paths: HashSet::new(),
            relations: Vec::new(),
            timestamps: false,
            transform: None,
            default_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Creates a builder for the given collection.
    pub fn builder(collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(collection)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns `true` if the dotted `path` is declared private.
    ///
    /// Fields without metadata are public.
    pub fn is_private(&self, path: &str) -> bool {
        self.private_paths.contains(path)
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Finds the relation exposed under `name`.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|relation| relation.name() == name)
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Page size used when paging options do not carry a valid limit.
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Builds the public representation of `document` with this schema.
    ///
    /// See [`crate::redact::to_public`].
    pub fn to_public(&self, document: &BsonDocument) -> BsonDocument {
        crate::redact::to_public(document, self)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("collection", &self.collection)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("timestamps", &self.timestamps)
            .field("transform", &self.transform.is_some())
            .field("default_limit", &self.default_limit)
            .finish()
    }
}

/// Builder for constructing [`Schema`] instances.
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { schema: Schema::new(collection) }
    }

    /// Declares a field with explicit metadata.
    pub fn field(mut self, path: impl Into<String>, private: bool) -> Self {
        let path = path.into();

        if private {
            self.schema.private_paths.insert(path.clone());
        } else {
            self.schema.private_paths.remove(&path);
        }

        self.schema.fields.retain(|field| field.path != path);
        self.schema.fields.push(FieldSpec { path, private });
        self
    }

    /// Declares a private field (dotted paths reach into nested documents).
    pub fn private(self, path: impl Into<String>) -> Self {
        self.field(path, true)
    }

    /// Declares a public field.
    pub fn public(self, path: impl Into<String>) -> Self {
        self.field(path, false)
    }

    /// Declares that `field` references documents of `collection` by identifier.
    pub fn reference(mut self, field: impl Into<String>, collection: impl Into<String>) -> Self {
        self.schema.relations.push(Relation::Ref {
            field: field.into(),
            collection: collection.into(),
        });
        self
    }

    /// Declares a virtual relation resolving to every document of `collection`
    /// whose `foreign_field` equals this document's `local_field`.
    pub fn virtual_relation(
        mut self,
        name: impl Into<String>,
        collection: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        self.schema.relations.push(Relation::Virtual {
            name: name.into(),
            collection: collection.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            just_one: false,
        });
        self
    }

    /// Like [`virtual_relation`](Self::virtual_relation) but resolves to a single
    /// document (or null).
    pub fn virtual_one(
        mut self,
        name: impl Into<String>,
        collection: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        self.schema.relations.push(Relation::Virtual {
            name: name.into(),
            collection: collection.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            just_one: true,
        });
        self
    }

    /// Enables managed `createdAt` / `updatedAt` fields.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.schema.timestamps = enabled;
        self
    }

    /// Sets the custom transform run after the built-in redaction.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&BsonDocument, &mut BsonDocument) + Send + Sync + 'static,
    {
        self.schema.transform = Some(Arc::new(transform));
        self
    }

    /// Sets the default page size. Zero is ignored.
    pub fn default_limit(mut self, limit: usize) -> Self {
        if limit > 0 {
            self.schema.default_limit = limit;
        }
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

/// Registry of schemas keyed by collection name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the schema for its collection.
    pub fn register(&mut self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);

        self.schemas
            .insert(schema.collection().to_string(), schema.clone());
        schema
    }

    pub fn get(&self, collection: &str) -> Option<Arc<Schema>> {
        self.schemas.get(collection).cloned()
    }

    /// Returns the registered schema, or an empty one for unknown collections.
    pub fn get_or_default(&self, collection: &str) -> Arc<Schema> {
        self.get(collection)
            .unwrap_or_else(|| Arc::new(Schema::new(collection)))
    }
}
