//! Page results with navigation metadata.
//!
//! [`Page`] is returned by `CollectionAccessor::get_page`: the documents of one page plus
//! the total number of matching documents and the neighbouring page numbers.

use serde::{Deserialize, Serialize};

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use doclink_core::page::Page;
///
/// let page: Page<u32> = Page::builder(vec![1, 2])
///     .with_count(10)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 2);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub count: u64,
    /// The next page number, if more pages exist.
    pub next_page: Option<u64>,
    /// The previous page number, if this is not the first page.
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Builds the page for 1-indexed `page` of `page_size` items out of `count` matches.
    pub fn for_offset(items: Vec<T>, count: u64, page: u64, page_size: u64) -> Self {
        let seen = page.saturating_mul(page_size);

        Page::builder(items)
            .with_count(count)
            .with_next_page(if seen < count { Some(page + 1) } else { None })
            .with_previous_page(if page > 1 { Some(page - 1) } else { None })
            .build()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<u64>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<u64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}
