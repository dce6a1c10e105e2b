use serde::{Deserialize, Serialize};

// ============================================================================
// Pagination
// ============================================================================

/// 1-based page request, already clamped by the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Clamp optional query values against configured limits.
    pub fn from_query(page: Option<u32>, per_page: Option<u32>, default_per_page: u32, max_per_page: u32) -> Self {
        let per_page = per_page.unwrap_or(default_per_page).min(max_per_page);
        Self::new(page.unwrap_or(1), per_page)
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }

    pub fn limit(&self) -> u64 {
        self.per_page as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        let total_pages = total.div_ceil(page.per_page as u64) as u32;
        Self {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
        }
    }

    /// Slice an already-ordered sequence (used by the in-memory store).
    pub fn from_ordered(all: Vec<T>, page: Page) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Self::new(items, total, page)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_clamps() {
        let page = Page::from_query(Some(0), Some(1000), 20, 100);
        assert_eq!(page, Page { page: 1, per_page: 100 });

        let page = Page::from_query(None, None, 20, 100);
        assert_eq!(page.per_page, 20);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_from_ordered_slices_last_page() {
        let paged = Paged::from_ordered((1..=7).collect::<Vec<_>>(), Page::new(3, 3));
        assert_eq!(paged.items, vec![7]);
        assert_eq!(paged.total, 7);
        assert_eq!(paged.total_pages, 3);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let paged = Paged::from_ordered(vec![1, 2], Page::new(5, 10));
        assert!(paged.items.is_empty());
        assert_eq!(paged.total_pages, 1);
    }
}
