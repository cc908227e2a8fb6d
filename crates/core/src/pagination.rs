//! Page arithmetic for stored article listings.

use serde::{Deserialize, Serialize};

use crate::models::PageInfo;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Clamp raw query values: page below 1 becomes 1, a page size outside
    /// `1..=100` becomes the default of 20.
    pub fn normalize(page: i64, page_size: i64) -> Self {
        let page = if page < 1 { 1 } else { page.min(u32::MAX as i64) as u32 };
        let page_size = if (1..=MAX_PAGE_SIZE as i64).contains(&page_size) {
            page_size as u32
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self { page, page_size }
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    /// Build the page envelope for `total` matching rows.
    pub fn page_info(&self, total: u64) -> PageInfo {
        PageInfo {
            page: self.page,
            num_pages: num_pages(total, self.page_size),
            page_size: self.page_size,
            num_entries: total.min(u32::MAX as u64) as u32,
        }
    }
}

/// `ceil(total / page_size)`; zero rows means zero pages.
pub fn num_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64).min(u32::MAX as u64) as u32
}
