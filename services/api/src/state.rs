//! Application state shared across handlers

use std::sync::Arc;

use auth::{Authenticator, RateLimiter};
use common::logging::LogSink;

use crate::repositories::CatalogStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub rate_limiter: RateLimiter,
    pub catalog: Arc<dyn CatalogStore>,
    pub log_sink: Arc<dyn LogSink>,
}
