//! Authentication library for the catalog API
//!
//! Provides the [`Authenticator`] (API keys, registration, login, bearer
//! tokens), the credential store seam and its PostgreSQL repository, and the
//! per-client [`RateLimiter`].

pub mod authenticator;
pub mod error;
pub mod jwt;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod store;
pub mod validation;

pub use authenticator::Authenticator;
pub use error::{AuthError, AuthResult};
pub use jwt::{Claims, JwtConfig, JwtService};
pub use rate_limiter::{RateDecision, RateLimiter, RateLimiterConfig};
pub use store::{CredentialStore, MemoryCredentialStore};
