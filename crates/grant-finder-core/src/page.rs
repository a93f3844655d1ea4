//! Result envelope: one page of records plus pagination metadata.

use serde::Serialize;

use crate::score::ScoredGrant;

/// A page of search results, matching the `GET /grants` response shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub items: Vec<ScoredGrant>,
    /// 1-based page index that was requested.
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    /// `ceil(total_count / page_size)`, never less than 1.
    pub total_pages: u64,
    pub has_more: bool,
    pub is_empty: bool,
}

impl ResultPage {
    pub fn assemble(items: Vec<ScoredGrant>, total_count: u64, page: u32, page_size: u32) -> Self {
        let total_pages = total_pages(total_count, page_size);
        Self {
            is_empty: items.is_empty(),
            has_more: u64::from(page) < total_pages,
            items,
            page,
            page_size,
            total_count,
            total_pages,
        }
    }
}

pub fn total_pages(total_count: u64, page_size: u32) -> u64 {
    total_count.div_ceil(u64::from(page_size.max(1))).max(1)
}
