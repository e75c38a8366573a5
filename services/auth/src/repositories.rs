//! Repositories for database operations

pub mod credentials;

pub use credentials::PgCredentialStore;
