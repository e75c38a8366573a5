//! Catalog store seam and its PostgreSQL repository

use async_trait::async_trait;
use common::error::DatabaseResult;

use crate::models::catalog::{CatalogItem, Movie};
use crate::query::CatalogQuery;

pub mod catalog;

pub use catalog::CatalogRepository;

/// Read access to the catalog tables
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// One page of rows plus the number of rows matching the filters
    async fn list(&self, query: &CatalogQuery) -> DatabaseResult<(Vec<CatalogItem>, i64)>;

    async fn find_movie(&self, id: i32) -> DatabaseResult<Option<Movie>>;

    /// Whether the store answers at all
    async fn ping(&self) -> bool;
}
