//! Common library for the catalog API
//!
//! This crate provides shared functionality used by the authentication and
//! catalog services: the PostgreSQL pool, the store error type, and the
//! classified request log.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//! use common::logging::{FileLogSink, LogEntry, LogSink, RequestMeta};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     println!("Database health check: {}", health_check(&pool).await?);
//!
//!     let (sink, _guard) = FileLogSink::open("logs")?;
//!     sink.record(LogEntry::Response {
//!         meta: RequestMeta::new("GET", "/"),
//!         status: 200,
//!         duration_ms: 0.4,
//!     });
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod logging;
