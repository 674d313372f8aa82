//! Pagination helper types for repository queries

use serde::{Deserialize, Serialize};

/// Offset pagination request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Current page number (0-indexed)
    pub page: u32,
    /// Number of items per page
    pub page_size: u32,
}

impl PageRequest {
    /// Create a new page request
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(2, 20);
    /// assert_eq!(request.offset(), 40);
    /// assert_eq!(request.limit(), 20);
    /// ```
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// SQL OFFSET value (`page * page_size`, saturating)
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size)
    }

    /// SQL LIMIT value
    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 50,
        }
    }
}

/// One page of results plus the cursor of the page after it.
///
/// `next` is `None` once a short page signals the end of the listing. Its
/// meaning depends on the listing: the next id for id-ordered pages, the next
/// page number for modified-date pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next: Option<i64>,
}

impl<T> CursorPage<T> {
    /// Page whose cursor is derived from its last item when the page is full.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::CursorPage;
    ///
    /// let page = CursorPage::after_last(vec![4_i64, 7, 9], 3, |id| *id + 1);
    /// assert_eq!(page.next, Some(10));
    ///
    /// let tail = CursorPage::after_last(vec![12_i64], 3, |id| *id + 1);
    /// assert_eq!(tail.next, None);
    /// ```
    pub fn after_last<F>(items: Vec<T>, page_size: u32, next_from: F) -> Self
    where
        F: FnOnce(&T) -> i64,
    {
        let full = page_size > 0 && items.len() >= page_size as usize;
        let next = if full { items.last().map(next_from) } else { None };
        Self { items, next }
    }

    /// Whether another page may follow
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> CursorPage<U>
    where
        F: FnMut(T) -> U,
    {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            next: self.next,
        }
    }
}
