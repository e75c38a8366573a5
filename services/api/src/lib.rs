//! Catalog API service
//!
//! Routes, the request pipeline that guards them, and the query builder
//! behind the catalog listings.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod query;
pub mod repositories;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
