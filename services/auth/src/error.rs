//! Error types for the authenticator

use common::error::DatabaseError;
use thiserror::Error;

/// Failures surfaced by [`crate::Authenticator`]
///
/// The variants map one-to-one onto the client-facing classification:
/// missing credentials are unauthenticated, wrong credentials are
/// forbidden, bad input is a bad request, and store or hashing failures
/// are server errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unauthorized: No API key provided")]
    NoApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Unauthorized: No token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("User already exists with this email")]
    EmailTaken,

    #[error("Username is already taken")]
    UsernameTaken,

    /// Unknown email and wrong password collapse into this variant
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

pub type AuthResult<T> = Result<T, AuthError>;
