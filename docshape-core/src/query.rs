//! Query construction and filtering API for document stores.
//!
//! This module provides filter expressions, compound sorting, skip/limit windows,
//! populate directives and a visitor pattern for translating filters per backend.
//!
//! # Query Building
//!
//! ```ignore
//! use docshape::query::{Query, Filter};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name", "Alice"))
//!     .sort_by("role,-createdAt")
//!     .populate("tasks.project")
//!     .offset(20)
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`
//!
//! Expressions can be combined using chainable methods for more complex queries.

use bson::Bson;

use crate::{error::DocumentStoreError, populate::PopulatePath};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name (dotted paths allowed) to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    /// Parses a comma-separated sort list.
    ///
    /// Each token is `field` (ascending), `-field` or `field:desc` (descending), or
    /// `field:asc`. Blank tokens are skipped; an order other than `desc` means
    /// ascending. The first token is the most significant key.
    ///
    /// ```ignore
    /// let keys = Sort::parse_list("name:desc, -createdAt,role");
    /// assert_eq!(keys, vec![Sort::desc("name"), Sort::desc("createdAt"), Sort::asc("role")]);
    /// ```
    pub fn parse_list(spec: &str) -> Vec<Sort> {
        spec.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter_map(|token| {
                let (field, direction) = match token.strip_prefix('-') {
                    Some(field) => (field, SortDirection::Desc),
                    None => match token.split_once(':') {
                        Some((field, order)) if order.trim().eq_ignore_ascii_case("desc") => (field, SortDirection::Desc),
                        Some((field, _)) => (field, SortDirection::Asc),
                        None => (token, SortDirection::Asc),
                    },
                };
                let field = field.trim();

                (!field.is_empty()).then(|| Sort::new(field, direction))
            })
            .collect()
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Array contains any of the values.
    AnyOf,
    /// Array contains none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
///
/// # Example
///
/// ```ignore
/// use docshape::query::{Expr, Filter, FieldOp};
///
/// // Simple equality check
/// let expr1 = Filter::eq("status", "active");
///
/// // Complex nested expression
/// let expr2 = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18)
/// ]);
/// ```
#[derive(Debug, Clone)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// A structured query for retrieving and filtering documents.
///
/// Backends honour `filter`, `sort`, `offset` and `limit`. `populate` is resolved by the
/// collection layer after the backend returns, so backends ignore it.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip (for pagination).
    pub offset: Option<usize>,
    /// Compound sort keys, most significant first. Empty means natural order.
    pub sort: Vec<Sort>,
    /// Relations to populate on the returned documents.
    pub populate: Vec<PopulatePath>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
///
/// # Example
///
/// ```ignore
/// use docshape::query::Filter;
///
/// let expr = Filter::eq("name", "Alice")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Field equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Field differs from `value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// String field starts with `value`.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// String field ends with `value`.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// String or array field contains `value`.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Field (scalar or array) matches any of the given values.
    ///
    /// This is how population looks up related documents by identifier.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Field (scalar or array) matches none of the given values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    ///
    /// # Arguments
    ///
    /// * `filter` - The filter expression to apply
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the maximum number of documents to return.
    ///
    /// # Arguments
    ///
    /// * `limit` - The maximum number of documents to return
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip (for pagination).
    ///
    /// # Arguments
    ///
    /// * `offset` - The number of documents to skip
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort::new(field, direction));
        self
    }

    /// Appends the keys of a comma-separated sort list (see [`Sort::parse_list`]).
    pub fn sort_by(mut self, spec: &str) -> Self {
        self.query.sort.extend(Sort::parse_list(spec));
        self
    }

    /// Appends the directives of a comma-separated populate list
    /// (see [`PopulatePath::parse_list`]).
    pub fn populate(mut self, spec: &str) -> Self {
        self.query.populate.extend(PopulatePath::parse_list(spec));
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
