//! Filter evaluation and ordering for in-memory documents.
//!
//! Field names are dotted paths into nested documents. Identifiers (UUID binaries and
//! ObjectIds) compare by identity, so `_id` filters and relation lookups behave the
//! same way they do against a real database.

use bson::{Bson, Document as BsonDocument, datetime::DateTime};
use std::{cmp::Ordering, collections::HashMap};

use docshape_core::{
    document::{get_path, id_string},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Borrowed, comparable view of a BSON value.
///
/// Integers and floats share one numeric space.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Id(String),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(_) | Bson::ObjectId(_) => Comparable::Id(id_string(bson)),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Cross-type ordering rank, following the order MongoDB uses for sorting.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Id(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: same-type values compare naturally, mixed types
    /// by rank.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => number_cmp(*a, *b),
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }

    /// Equality with array fields matching any element, as MongoDB does for scalars.
    fn matches(&self, value: &Comparable<'_>) -> bool {
        match (self, value) {
            (Comparable::Array(items), single) if !matches!(single, Comparable::Array(_)) => {
                items.iter().any(|item| item == single)
            }
            _ => self == value,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Id(a), Comparable::Id(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::Id(a), Comparable::Id(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// NaN sorts below every other number and equal to itself.
fn number_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compares two documents by a list of sort keys, most significant first.
///
/// Missing fields sort as null.
pub(crate) fn compare_documents(left: &BsonDocument, right: &BsonDocument, keys: &[Sort]) -> Ordering {
    for key in keys {
        let a = get_path(left, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let b = get_path(right, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => a.sort_cmp(&b),
            SortDirection::Desc => b.sort_cmp(&a),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a BsonDocument,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a BsonDocument) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns whether `document` satisfies `filter` (`None` matches everything).
    pub fn matches(document: &BsonDocument, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = get_path(self.document, field) else {
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };

        let left = Comparable::from(field_value);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => left.matches(&right),
            FieldOp::Ne => !left.matches(&right),
            FieldOp::Gt => left.partial_cmp(&right) == Some(Ordering::Greater),
            FieldOp::Gte => matches!(left.partial_cmp(&right), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::Lt => left.partial_cmp(&right) == Some(Ordering::Less),
            FieldOp::Lte => matches!(left.partial_cmp(&right), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::Contains => contains(&left, &right),
            FieldOp::NotContains => !contains(&left, &right),
            FieldOp::StartsWith => match (&left, &right) {
                (Comparable::String(l), Comparable::String(r)) => l.starts_with(r),
                _ => false,
            },
            FieldOp::EndsWith => match (&left, &right) {
                (Comparable::String(l), Comparable::String(r)) => l.ends_with(r),
                _ => false,
            },
            FieldOp::AnyOf => any_of(&left, &right),
            FieldOp::NoneOf => !any_of(&left, &right),
        })
    }
}

fn contains(left: &Comparable<'_>, right: &Comparable<'_>) -> bool {
    match (left, right) {
        (Comparable::Array(items), _) => items.iter().any(|item| item == right),
        (Comparable::String(l), Comparable::String(r)) => l.contains(r),
        _ => false,
    }
}

fn any_of(left: &Comparable<'_>, right: &Comparable<'_>) -> bool {
    match right {
        Comparable::Array(values) => values.iter().any(|value| left.matches(value)),
        single => left.matches(single),
    }
}
