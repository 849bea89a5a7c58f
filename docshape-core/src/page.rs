//! Pagination options, page results and the `paginate` operation.
//!
//! [`paginate`] counts the documents matching a filter and fetches one sorted,
//! populated window of them, concurrently, then assembles a [`PageResult`]. Malformed
//! paging input (missing, zero, negative or non-numeric `limit`/`page`) falls back to
//! the defaults instead of failing.
//!
//! # Example
//!
//! ```ignore
//! use docshape::page::PageOptions;
//!
//! let options = PageOptions::builder()
//!     .sort_by("name:desc")
//!     .populate("tasks.project")
//!     .limit(2)
//!     .page(2)
//!     .build();
//!
//! let page = store.collection("projects").paginate(None, &options).await?;
//! assert!(page.results().len() <= 2);
//! ```

use bson::Document as BsonDocument;
use serde::{Deserialize, Deserializer, Serialize, de::IgnoredAny};
use tracing::{debug, instrument};

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::DocumentStoreResult,
    populate::PopulatePath,
    query::{Expr, Query, Sort},
};

/// Paging options as received from a caller.
///
/// Deserializes from JSON or query-string shapes (`sortBy`, `populate`, `limit`,
/// `page`); numeric options may arrive as numbers or numeric strings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageOptions {
    /// Comma-separated sort keys: `field`, `-field`, `field:asc`, `field:desc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    /// Comma-separated relation paths, dotted for nested relations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populate: Option<String>,
    /// Maximum number of results per page.
    #[serde(default, deserialize_with = "deserialize_positive", skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// 1-indexed page number.
    #[serde(default, deserialize_with = "deserialize_positive", skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

impl PageOptions {
    pub fn builder() -> PageOptionsBuilder {
        PageOptionsBuilder::default()
    }

    /// The effective page size: `limit` when positive, else `default` (at least 1).
    pub fn resolved_limit(&self, default: usize) -> usize {
        self.limit
            .filter(|limit| *limit > 0)
            .unwrap_or(default.max(1))
    }

    /// The effective page number: `page` when positive, else 1.
    pub fn resolved_page(&self) -> usize {
        self.page
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }

    /// Number of documents to skip for the effective page.
    pub fn skip(&self, default_limit: usize) -> usize {
        (self.resolved_page() - 1).saturating_mul(self.resolved_limit(default_limit))
    }

    /// Parsed sort keys; empty means natural order.
    pub fn sort(&self) -> Vec<Sort> {
        self.sort_by
            .as_deref()
            .map(Sort::parse_list)
            .unwrap_or_default()
    }

    /// Parsed populate directives.
    pub fn populate_paths(&self) -> Vec<PopulatePath> {
        self.populate
            .as_deref()
            .map(PopulatePath::parse_list)
            .unwrap_or_default()
    }
}

/// Builder for [`PageOptions`].
#[derive(Debug, Default)]
pub struct PageOptionsBuilder {
    options: PageOptions,
}

impl PageOptionsBuilder {
    pub fn sort_by(mut self, spec: impl Into<String>) -> Self {
        self.options.sort_by = Some(spec.into());
        self
    }

    pub fn populate(mut self, spec: impl Into<String>) -> Self {
        self.options.populate = Some(spec.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.options.page = Some(page);
        self
    }

    pub fn build(self) -> PageOptions {
        self.options
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Integer(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

fn deserialize_positive<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LenientNumber>::deserialize(deserializer)? {
        Some(LenientNumber::Integer(value)) if value > 0 => usize::try_from(value).ok(),
        Some(LenientNumber::Float(value)) if value >= 1.0 && value.fract() == 0.0 && value <= usize::MAX as f64 => {
            Some(value as usize)
        }
        Some(LenientNumber::Text(value)) => value
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|value| *value > 0),
        _ => None,
    })
}

/// One page of results plus navigation metadata.
///
/// Serializes as `{results, page, limit, totalPages, totalResults}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    results: Vec<T>,
    page: usize,
    limit: usize,
    total_pages: u64,
    total_results: u64,
}

impl<T> PageResult<T> {
    /// Assembles a page; `total_pages` is derived from `total_results` and `limit`.
    pub fn new(results: Vec<T>, page: usize, limit: usize, total_results: u64) -> Self {
        Self {
            results,
            page,
            limit,
            total_pages: total_pages(total_results, limit),
            total_results,
        }
    }

    pub fn results(&self) -> &[T] {
        &self.results
    }

    pub fn into_results(self) -> Vec<T> {
        self.results
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    /// The next page number, if there is one.
    pub fn next_page(&self) -> Option<usize> {
        ((self.page as u64) < self.total_pages).then(|| self.page + 1)
    }

    /// The previous page number, unless this is the first page.
    pub fn previous_page(&self) -> Option<usize> {
        (self.page > 1).then(|| self.page - 1)
    }

    /// Returns a new page with every result converted by `f`.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }

    /// Like [`map`](Self::map) with a fallible conversion.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PageResult<U>, E> {
        Ok(PageResult {
            results: self.results.into_iter().map(f).collect::<Result<Vec<_>, _>>()?,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        })
    }
}

/// `ceil(total_results / limit)`, zero when there are no results.
pub fn total_pages(total_results: u64, limit: usize) -> u64 {
    total_results.div_ceil(limit.max(1) as u64)
}

/// Fetches one page of `collection`.
///
/// The count and the windowed fetch are independent reads and run concurrently.
///
/// # Errors
///
/// Backend errors from either read propagate unchanged.
#[instrument(skip(collection, filter, options), fields(collection = collection.name()))]
pub async fn paginate<B: StoreBackend>(
    collection: &Collection<'_, B>,
    filter: Option<Expr>,
    options: &PageOptions,
) -> DocumentStoreResult<PageResult<BsonDocument>> {
    let default_limit = collection.schema().default_limit();
    let limit = options.resolved_limit(default_limit);
    let page = options.resolved_page();
    let skip = options.skip(default_limit);

    debug!(page, limit, skip, "paginating");

    let query = Query {
        filter: filter.clone(),
        limit: Some(limit),
        offset: Some(skip),
        sort: options.sort(),
        populate: options.populate_paths(),
    };

    let (total_results, results) = futures::try_join!(collection.count(filter), collection.find(query))?;

    Ok(PageResult::new(results, page, limit, total_results))
}
