//! API models for request and response payloads

use serde::Serialize;

pub mod catalog;

/// Paginated listing envelope
///
/// `total_results` counts every row matching the filters, not only the rows
/// on this page.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    pub total_results: i64,
    pub data: Vec<T>,
}
