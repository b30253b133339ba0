//! Filtered, sorted, paginated access to a record collection.
//!
//! The pipeline is filter → sort → count → slice. For a fixed collection and
//! a fixed [`PageRequest`] the output is fully deterministic: ordering is by
//! name with ties broken by id, so repeated requests never reshuffle rows
//! across page boundaries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Record;

/// Page size used by the incremental list view.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("page cursor must be a positive integer")]
    ZeroCursor,
    #[error("page size must be a positive integer")]
    ZeroPageSize,
}

/// One page of a filtered listing. Sorting is fixed to name ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    cursor: u32,
    page_size: u32,
    filter: Option<String>,
}

impl PageRequest {
    pub fn new(cursor: u32, page_size: u32, filter: Option<String>) -> Result<Self, QueryError> {
        if cursor == 0 {
            return Err(QueryError::ZeroCursor);
        }
        if page_size == 0 {
            return Err(QueryError::ZeroPageSize);
        }
        Ok(Self {
            cursor,
            page_size,
            filter: normalize_filter(filter),
        })
    }

    /// Page 1 of a new listing.
    pub fn first(page_size: u32, filter: Option<String>) -> Result<Self, QueryError> {
        Self::new(1, page_size, filter)
    }

    /// The request for the page right after this one, same filter.
    pub fn next_page(&self) -> Self {
        Self {
            cursor: self.cursor.saturating_add(1),
            page_size: self.page_size,
            filter: self.filter.clone(),
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Index of the first record on this page.
    pub fn offset(&self) -> usize {
        (self.cursor as usize - 1).saturating_mul(self.page_size as usize)
    }
}

/// An empty filter string means "no filter".
pub fn normalize_filter(filter: Option<String>) -> Option<String> {
    filter.filter(|f| !f.is_empty())
}

/// A page of records plus the number of records matching the filter overall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub items: Vec<Record>,
    pub total_matches: u64,
}

/// Run the full pipeline against a snapshot of the collection.
pub fn query_page(records: Vec<Record>, req: &PageRequest) -> PageResult {
    let mut matched = filter_records(records, req.filter());
    sort_records(&mut matched);

    let total_matches = matched.len() as u64;
    let start = req.offset().min(matched.len());
    let end = start
        .saturating_add(req.page_size() as usize)
        .min(matched.len());

    PageResult {
        items: matched.drain(start..end).collect(),
        total_matches,
    }
}

/// Keep records where any field, rendered as text, contains `filter`
/// case-insensitively.
pub fn filter_records(records: Vec<Record>, filter: Option<&str>) -> Vec<Record> {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return records;
    };
    let needle = filter.to_lowercase();
    records
        .into_iter()
        .filter(|r| matches_filter(r, &needle))
        .collect()
}

/// `needle` must already be lowercased.
pub fn matches_filter(record: &Record, needle: &str) -> bool {
    record
        .searchable_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Sort by name ascending, ties broken by id.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(compare_records);
}

pub fn compare_records(a: &Record, b: &Record) -> Ordering {
    compare_names(&a.name, &b.name).then_with(|| a.id.cmp(&b.id))
}

/// Collation-style name ordering: letters compare case-insensitively first,
/// then lowercase sorts before uppercase, then raw code points decide.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let primary = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));

    primary
        .then_with(|| {
            a.chars()
                .map(|c| c.is_uppercase())
                .cmp(b.chars().map(|c| c.is_uppercase()))
        })
        .then_with(|| a.cmp(b))
}
