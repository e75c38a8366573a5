//! Catalog repository backed by PostgreSQL

use async_trait::async_trait;
use common::{
    database::health_check,
    error::{DatabaseError, DatabaseResult},
};
use sqlx::{Arguments, PgPool, postgres::PgArguments};
use tracing::debug;

use super::CatalogStore;
use crate::models::catalog::{CatalogItem, Movie, Person, TvShow};
use crate::query::{BuiltQuery, CatalogQuery, Resource, SqlValue};

/// Catalog repository
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    /// Create a new catalog repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_page<T>(&self, query: &BuiltQuery) -> DatabaseResult<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        sqlx::query_as_with::<_, T, _>(&query.sql, bind_all(&query.params)?)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_query)
    }

    async fn count(&self, query: &BuiltQuery) -> DatabaseResult<i64> {
        sqlx::query_scalar_with::<_, i64, _>(&query.sql, bind_all(&query.params)?)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_query)
    }
}

/// Turn builder values into positional Postgres arguments
fn bind_all(params: &[SqlValue]) -> DatabaseResult<PgArguments> {
    let mut args = PgArguments::default();
    for value in params {
        let added = match value {
            SqlValue::Text(text) => args.add(text.clone()),
            SqlValue::Int(int) => args.add(*int),
            SqlValue::BigInt(int) => args.add(*int),
            SqlValue::Float(float) => args.add(*float),
        };
        added.map_err(|e| DatabaseError::Query(sqlx::Error::Encode(e)))?;
    }
    Ok(args)
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn list(&self, query: &CatalogQuery) -> DatabaseResult<(Vec<CatalogItem>, i64)> {
        let page = query.build();
        debug!("Listing {}: {}", query.resource.segment(), page.sql);

        let items = match query.resource {
            Resource::Movies => self
                .fetch_page::<Movie>(&page)
                .await?
                .into_iter()
                .map(CatalogItem::Movie)
                .collect(),
            Resource::TvShows => self
                .fetch_page::<TvShow>(&page)
                .await?
                .into_iter()
                .map(CatalogItem::TvShow)
                .collect(),
            Resource::Actors => self
                .fetch_page::<Person>(&page)
                .await?
                .into_iter()
                .map(CatalogItem::Actor)
                .collect(),
            Resource::Directors => self
                .fetch_page::<Person>(&page)
                .await?
                .into_iter()
                .map(CatalogItem::Director)
                .collect(),
        };

        let total = self.count(&query.build_count()).await?;
        Ok((items, total))
    }

    async fn find_movie(&self, id: i32) -> DatabaseResult<Option<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies WHERE id = $1",
            Resource::Movies.columns()
        );
        sqlx::query_as::<_, Movie>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)
    }

    async fn ping(&self) -> bool {
        health_check(&self.pool).await.unwrap_or(false)
    }
}
