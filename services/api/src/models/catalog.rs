//! Catalog models for the API service

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Movie model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub original_title: Option<String>,
    pub year: i32,
    pub genre: Option<String>,
    pub imdb_rating: Option<f64>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub trailer_url: Option<String>,
    pub director_id: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// TV show model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TvShow {
    pub id: i32,
    pub title: String,
    pub original_title: Option<String>,
    pub seasons: Option<i32>,
    pub episodes: Option<i32>,
    pub genre: Option<String>,
    pub imdb_rating: Option<f64>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub trailer_url: Option<String>,
    pub creator_id: Option<i32>,
}

/// Actors and directors share one shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub biography: Option<String>,
    pub profile_pic: Option<String>,
}

/// Any row of a catalog listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CatalogItem {
    Movie(Movie),
    TvShow(TvShow),
    Actor(Person),
    Director(Person),
}
