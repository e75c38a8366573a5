//! Parameterized query construction for catalog listings
//!
//! A [`CatalogQuery`] is parsed from raw query-string parameters and turned
//! into SQL by a builder that only appends `&'static str` fragments. Every
//! user-supplied value becomes a positional bind parameter; the only
//! identifier taken from the request is the sort column, and it can only be
//! one of the [`SortColumn`] variants allowed for the resource.

use std::collections::HashMap;

use thiserror::Error;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Catalog resources exposed under `/api`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Movies,
    TvShows,
    Actors,
    Directors,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Movies,
        Resource::TvShows,
        Resource::Actors,
        Resource::Directors,
    ];

    /// Resolve the first path segment after `/api`
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "movies" => Some(Resource::Movies),
            "tvshows" => Some(Resource::TvShows),
            "actors" => Some(Resource::Actors),
            "directors" => Some(Resource::Directors),
            _ => None,
        }
    }

    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Movies => "movies",
            Resource::TvShows => "tvshows",
            Resource::Actors => "actors",
            Resource::Directors => "directors",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Resource::Movies => "movies",
            Resource::TvShows => "tv_shows",
            Resource::Actors => "actors",
            Resource::Directors => "directors",
        }
    }

    /// Projection used for every listing of this resource
    pub fn columns(&self) -> &'static str {
        match self {
            Resource::Movies => {
                "id, title, original_title, year, genre, imdb_rating::float8 AS imdb_rating, \
                 description, poster_url, trailer_url, director_id, created_at, updated_at"
            }
            Resource::TvShows => {
                "id, title, original_title, seasons, episodes, genre, \
                 imdb_rating::float8 AS imdb_rating, description, poster_url, trailer_url, creator_id"
            }
            Resource::Actors | Resource::Directors => {
                "id, name, birth_date, nationality, biography, profile_pic"
            }
        }
    }

    /// Filters recognized for this resource, in the order they are applied
    pub fn filters(&self) -> &'static [FilterField] {
        match self {
            Resource::Movies => &[
                FilterField::Genre,
                FilterField::Year,
                FilterField::MinRating,
                FilterField::DirectorId,
            ],
            Resource::TvShows => &[
                FilterField::Genre,
                FilterField::MinRating,
                FilterField::Seasons,
            ],
            Resource::Actors | Resource::Directors => &[FilterField::Nationality],
        }
    }

    /// Sort allow-list; anything else yields `None`
    pub fn sort_column(&self, raw: &str) -> Option<SortColumn> {
        match (self, raw) {
            (Resource::Movies, "year") => Some(SortColumn::Year),
            (Resource::Movies | Resource::TvShows, "imdb_rating") => Some(SortColumn::ImdbRating),
            (Resource::TvShows, "seasons") => Some(SortColumn::Seasons),
            (Resource::TvShows, "episodes") => Some(SortColumn::Episodes),
            (Resource::Actors | Resource::Directors, "name") => Some(SortColumn::Name),
            (Resource::Actors | Resource::Directors, "birth_date") => Some(SortColumn::BirthDate),
            _ => None,
        }
    }
}

/// Columns that may appear in an ORDER BY clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Year,
    ImdbRating,
    Seasons,
    Episodes,
    Name,
    BirthDate,
}

impl SortColumn {
    pub fn column(&self) -> &'static str {
        match self {
            SortColumn::Year => "year",
            SortColumn::ImdbRating => "imdb_rating",
            SortColumn::Seasons => "seasons",
            SortColumn::Episodes => "episodes",
            SortColumn::Name => "name",
            SortColumn::BirthDate => "birth_date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Only an explicit `desc` sorts descending
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(order) if order.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equals,
    AtLeast,
}

impl Comparison {
    fn operator(&self) -> &'static str {
        match self {
            Comparison::Equals => " = ",
            Comparison::AtLeast => " >= ",
        }
    }
}

/// Query parameters that become predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Genre,
    Year,
    MinRating,
    DirectorId,
    Seasons,
    Nationality,
}

impl FilterField {
    /// Name of the query-string parameter
    pub fn param(&self) -> &'static str {
        match self {
            FilterField::Genre => "genre",
            FilterField::Year => "year",
            FilterField::MinRating => "min_rating",
            FilterField::DirectorId => "director_id",
            FilterField::Seasons => "seasons",
            FilterField::Nationality => "nationality",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            FilterField::Genre => "genre",
            FilterField::Year => "year",
            FilterField::MinRating => "imdb_rating",
            FilterField::DirectorId => "director_id",
            FilterField::Seasons => "seasons",
            FilterField::Nationality => "nationality",
        }
    }

    fn comparison(&self) -> Comparison {
        match self {
            FilterField::MinRating => Comparison::AtLeast,
            _ => Comparison::Equals,
        }
    }

    fn parse(&self, raw: &str) -> Result<SqlValue, QueryError> {
        let invalid = || QueryError::InvalidFilter {
            param: self.param(),
            value: raw.to_string(),
        };

        match self {
            FilterField::Genre | FilterField::Nationality => Ok(SqlValue::Text(raw.to_string())),
            FilterField::Year | FilterField::DirectorId | FilterField::Seasons => {
                raw.parse::<i32>().map(SqlValue::Int).map_err(|_| invalid())
            }
            FilterField::MinRating => raw
                .parse::<f64>()
                .ok()
                .filter(|rating| rating.is_finite())
                .map(SqlValue::Float)
                .ok_or_else(invalid),
        }
    }
}

/// A value bound positionally into a statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i32),
    BigInt(i64),
    Float(f64),
}

/// A single conjunctive predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: FilterField,
    pub value: SqlValue,
}

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("Invalid value '{value}' for query parameter '{param}'")]
    InvalidFilter { param: &'static str, value: String },
}

/// SQL text plus the values bound to its `$n` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Appends trusted fragments and numbers placeholders
struct SqlBuilder {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &'static str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    fn push_bind(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        self.sql.push('$');
        self.sql.push_str(&self.params.len().to_string());
        self
    }

    fn finish(self) -> BuiltQuery {
        BuiltQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// A validated listing request for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub resource: Resource,
    pub filters: Vec<Filter>,
    pub sort: Option<(SortColumn, SortOrder)>,
    pub page: u32,
    pub limit: u32,
}

impl CatalogQuery {
    /// Unfiltered first page with default size
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            filters: Vec::new(),
            sort: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Parse raw query-string parameters
    ///
    /// Unknown parameters and empty filter values are ignored, and so is a
    /// `sort_by` outside the allow-list. Missing, non-numeric or
    /// non-positive `page` means 1; missing or non-numeric `limit` means 10
    /// and any other value is clamped to `1..=100`. A filter value of the
    /// wrong type is an error.
    pub fn from_params(
        resource: Resource,
        params: &HashMap<String, String>,
    ) -> Result<Self, QueryError> {
        let mut query = Self::new(resource);

        for field in resource.filters() {
            let raw = match params.get(field.param()).map(|v| v.trim()) {
                Some(raw) if !raw.is_empty() => raw,
                _ => continue,
            };
            query.filters.push(Filter {
                field: *field,
                value: field.parse(raw)?,
            });
        }

        query.sort = params
            .get("sort_by")
            .and_then(|raw| resource.sort_column(raw.trim()))
            .map(|column| {
                (
                    column,
                    SortOrder::parse(params.get("order").map(|o| o.trim())),
                )
            });

        query.page = params
            .get("page")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|page| page.clamp(1, i64::from(i32::MAX)) as u32)
            .unwrap_or(DEFAULT_PAGE);

        query.limit = params
            .get("limit")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|limit| limit.clamp(1, i64::from(MAX_LIMIT)) as u32)
            .unwrap_or(DEFAULT_LIMIT);

        Ok(query)
    }

    /// `(page - 1) * limit`
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }

    fn push_predicates(&self, builder: &mut SqlBuilder) {
        for (i, filter) in self.filters.iter().enumerate() {
            builder
                .push(if i == 0 { " WHERE " } else { " AND " })
                .push(filter.field.column())
                .push(filter.field.comparison().operator())
                .push_bind(filter.value.clone());
        }
    }

    /// Page-bounded selection
    pub fn build(&self) -> BuiltQuery {
        let mut builder = SqlBuilder::new();
        builder
            .push("SELECT ")
            .push(self.resource.columns())
            .push(" FROM ")
            .push(self.resource.table());

        self.push_predicates(&mut builder);

        if let Some((column, order)) = self.sort {
            builder
                .push(" ORDER BY ")
                .push(column.column())
                .push(order.keyword());
        }

        builder
            .push(" LIMIT ")
            .push_bind(SqlValue::BigInt(i64::from(self.limit)))
            .push(" OFFSET ")
            .push_bind(SqlValue::BigInt(self.offset()));

        builder.finish()
    }

    /// Count of all rows matching the filters, ignoring pagination
    pub fn build_count(&self) -> BuiltQuery {
        let mut builder = SqlBuilder::new();
        builder
            .push("SELECT COUNT(*) FROM ")
            .push(self.resource.table());
        self.push_predicates(&mut builder);
        builder.finish()
    }
}

/// Parse and build in one step
pub fn build(
    resource: Resource,
    params: &HashMap<String, String>,
) -> Result<BuiltQuery, QueryError> {
    CatalogQuery::from_params(resource, params).map(|query| query.build())
}
