//! Page-number pagination helpers.
//!
//! Listings are paged at a fixed size with forgiving request handling: a
//! missing or non-numeric `?page=` falls back to the first page, and a page
//! number beyond the end clamps to the last valid page. An empty collection
//! still produces one valid (empty) page.

use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Raw `?page=` query parameter. Kept as a string so that garbage input
/// degrades to page one instead of a 400.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn requested(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|number| *number >= 1)
            .unwrap_or(1)
    }
}

/// One resolved page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn empty(per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            number: 1,
            total_pages: 1,
            total_items: 0,
            per_page,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn previous_number(&self) -> u32 {
        self.number.saturating_sub(1).max(1)
    }

    pub fn next_number(&self) -> u32 {
        (self.number + 1).min(self.total_pages)
    }
}

/// Offset window for repository-backed listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub total_pages: u32,
    pub offset: i64,
    pub limit: i64,
}

pub fn total_pages(total_items: u64, per_page: u32) -> u32 {
    debug_assert!(per_page > 0);
    let per_page = u64::from(per_page.max(1));
    let pages = total_items.div_ceil(per_page).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

pub fn clamp_page(requested: u32, total_pages: u32) -> u32 {
    requested.clamp(1, total_pages.max(1))
}

/// Resolve the offset window for a count-then-fetch listing, clamping the
/// requested page into range first.
pub fn window(total_items: u64, requested: u32, per_page: u32) -> PageWindow {
    let total_pages = total_pages(total_items, per_page);
    let number = clamp_page(requested, total_pages);
    PageWindow {
        number,
        total_pages,
        offset: i64::from(number - 1) * i64::from(per_page),
        limit: i64::from(per_page),
    }
}

/// Paginate an already-materialized collection, as used for the cached
/// global feed.
pub fn paginate_slice<T: Clone>(items: &[T], requested: u32, per_page: u32) -> Page<T> {
    let total_items = items.len() as u64;
    let window = window(total_items, requested, per_page);

    let start = usize::try_from(window.offset).unwrap_or(usize::MAX);
    let end = start
        .saturating_add(per_page as usize)
        .min(items.len());
    let page_items = if start >= items.len() {
        Vec::new()
    } else {
        items[start..end].to_vec()
    };

    Page {
        items: page_items,
        number: window.number,
        total_pages: window.total_pages,
        total_items,
        per_page,
    }
}

/// Build a page from a repository count plus the fetched window of rows.
pub fn page_from_window<T>(items: Vec<T>, window: PageWindow, total_items: u64, per_page: u32) -> Page<T> {
    Page {
        items,
        number: window.number,
        total_pages: window.total_pages,
        total_items,
        per_page,
    }
}
