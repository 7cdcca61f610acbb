//! Query options and their translation into driver find plans.
//!
//! A [`QueryOptions`] value is the declarative options bag accepted by read operations
//! (page size, page number, last-seen id, sort order). [`QueryOptions::translate`] turns it,
//! together with a base filter, into a [`FindPlan`]: the filter plus the cursor operations
//! (sort, skip, limit) a driver applies.
//!
//! # Paging
//!
//! - Without a page size the base filter is used as-is and only an explicit sort applies.
//! - With a page size and a `last_id`, the filter gains `_id > last_id` and the plan is
//!   limited to the page size (keyset pagination, no skip).
//! - With a page size and no `last_id`, the plan skips `page_size * (page - 1)` documents
//!   and is limited to the page size.
//! - When offset paging applies and no sort was requested, results are sorted by `_id`
//!   descending. Keyset paging without a sort walks `_id` ascending, the order its `$gt`
//!   bound advances in.
//!
//! ```ignore
//! use doclink_core::query::{QueryOptions, SortDirection};
//!
//! let plan = QueryOptions::new()
//!     .page_size(20)
//!     .page(3)
//!     .sort(SortDirection::Asc)
//!     .translate(doc! { "kind": "click" })?;
//!
//! assert_eq!(plan.skip, Some(40));
//! assert_eq!(plan.limit, Some(20));
//! ```

use bson::{Bson, Document, doc};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the primary id field on every document.
pub const ID_FIELD: &str = "_id";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The driver's integer encoding of this direction (`1` or `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl TryFrom<i32> for SortDirection {
    type Error = DocumentStoreError;

    fn try_from(value: i32) -> DocumentStoreResult<Self> {
        match value {
            1 => Ok(SortDirection::Asc),
            -1 => Ok(SortDirection::Desc),
            other => Err(DocumentStoreError::InvalidOptions(format!(
                "sort direction must be 1 or -1, got {other}"
            ))),
        }
    }
}

/// A requested sort: a bare direction on the primary id, or a field mapping passed
/// to the driver verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum SortOrder {
    Direction(SortDirection),
    Fields(Document),
}

impl SortOrder {
    /// Renders this sort order as a driver sort document.
    pub fn to_document(&self) -> Document {
        match self {
            SortOrder::Direction(direction) => doc! { ID_FIELD: direction.as_i32() },
            SortOrder::Fields(fields) => fields.clone(),
        }
    }
}

impl From<SortDirection> for SortOrder {
    fn from(direction: SortDirection) -> Self {
        SortOrder::Direction(direction)
    }
}

impl From<Document> for SortOrder {
    fn from(fields: Document) -> Self {
        SortOrder::Fields(fields)
    }
}

/// Declarative paging and sorting options for read operations.
///
/// Page size and page are signed so that non-positive values coming from untyped input
/// can be reported as [`DocumentStoreError::InvalidOptions`] instead of being dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Number of documents per page. Paging is off when unset.
    pub page_size: Option<i64>,
    /// 1-indexed page number, defaults to 1. Ignored when `last_id` is set.
    pub page: Option<i64>,
    /// Last primary id seen by the caller, for keyset pagination.
    pub last_id: Option<Bson>,
    /// Requested sort order.
    pub sort: Option<SortOrder>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn last_id(mut self, last_id: impl Into<Bson>) -> Self {
        self.last_id = Some(last_id.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<SortOrder>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Returns the validated page size, or `None` when paging is not requested.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] for a zero or negative page size.
    pub fn validated_page_size(&self) -> DocumentStoreResult<Option<u64>> {
        match self.page_size {
            None => Ok(None),
            Some(size) if size <= 0 => Err(DocumentStoreError::InvalidOptions(format!(
                "page size must be a positive integer, got {size}"
            ))),
            Some(size) => Ok(Some(size as u64)),
        }
    }

    /// Returns the validated 1-indexed page number.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] for a zero or negative page.
    pub fn validated_page(&self) -> DocumentStoreResult<u64> {
        match self.page {
            None => Ok(1),
            Some(page) if page <= 0 => Err(DocumentStoreError::InvalidOptions(format!(
                "page must be a positive integer, got {page}"
            ))),
            Some(page) => Ok(page as u64),
        }
    }

    /// Translates these options and a base filter into a [`FindPlan`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] for a non-positive page size or page,
    /// or when the requested offset overflows.
    pub fn translate(&self, filter: Document) -> DocumentStoreResult<FindPlan> {
        let mut plan = FindPlan::new(filter);

        let default_sort = match self.validated_page_size()? {
            None => None,
            Some(page_size) => {
                match &self.last_id {
                    Some(last_id) => {
                        plan.filter = after_id(plan.filter, last_id.clone());
                    }
                    None => {
                        let page = self.validated_page()?;
                        let skip = page_size.checked_mul(page - 1).ok_or_else(|| {
                            DocumentStoreError::InvalidOptions(format!(
                                "offset for page {page} with page size {page_size} overflows"
                            ))
                        })?;
                        plan.skip = Some(skip);
                    }
                }

                plan.limit = Some(page_size);

                match self.last_id {
                    Some(_) => Some(SortDirection::Asc),
                    None => Some(SortDirection::Desc),
                }
            }
        };

        plan.sort = match &self.sort {
            Some(order) => Some(order.to_document()),
            None => default_sort.map(|direction| SortOrder::Direction(direction).to_document()),
        };

        tracing::debug!(
            filter = %plan.filter,
            skip = ?plan.skip,
            limit = ?plan.limit,
            sort = ?plan.sort,
            "Translated query options"
        );

        Ok(plan)
    }
}

/// Adds a strict `_id > last_id` bound to a filter.
fn after_id(mut filter: Document, last_id: Bson) -> Document {
    let bound = doc! { "$gt": last_id };

    if filter.contains_key(ID_FIELD) {
        doc! { "$and": [Bson::Document(filter), { ID_FIELD: bound }] }
    } else {
        filter.insert(ID_FIELD, bound);
        filter
    }
}

/// A single cursor operation applied to a find.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorOp {
    Sort(Document),
    Skip(u64),
    Limit(u64),
}

/// A fully configured find: filter plus cursor configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindPlan {
    /// Filter document passed to the driver unmodified.
    pub filter: Document,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Sort document.
    pub sort: Option<Document>,
}

impl FindPlan {
    /// Creates a plan that only filters.
    pub fn new(filter: Document) -> Self {
        Self { filter, skip: None, limit: None, sort: None }
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// The cursor operations of this plan in the order a cursor applies them:
    /// sort, then skip, then limit.
    pub fn cursor_ops(&self) -> Vec<CursorOp> {
        let mut ops = Vec::with_capacity(3);

        if let Some(sort) = &self.sort {
            ops.push(CursorOp::Sort(sort.clone()));
        }
        if let Some(skip) = self.skip {
            ops.push(CursorOp::Skip(skip));
        }
        if let Some(limit) = self.limit {
            ops.push(CursorOp::Limit(limit));
        }

        ops
    }
}
