//! API key validation, registration, login and bearer authentication
//!
//! The two trust factors are kept apart: an API key identifies the calling
//! application, a bearer token identifies the end user. Callers decide
//! which of them a route needs.

use std::sync::Arc;

use common::error::DatabaseError;
use tracing::{error, info, warn};

use crate::{
    error::{AuthError, AuthResult},
    jwt::{Claims, JwtService},
    models::{LoginCredentials, NewUser, PublicUser, UserRecord},
    password::{hash_password_async, verify_password_async},
    store::CredentialStore,
    validation::validate_new_user,
};

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: JwtService) -> Self {
        Self { store, jwt }
    }

    /// Check an `x-api-key` value against the store
    ///
    /// Every call performs exactly one lookup; nothing is cached.
    pub async fn validate_api_key(&self, raw_key: Option<&str>) -> AuthResult<()> {
        let key = match raw_key.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AuthError::NoApiKey),
        };

        if self.store.api_key_exists(key).await? {
            Ok(())
        } else {
            warn!("Rejected request with unknown API key");
            Err(AuthError::InvalidApiKey)
        }
    }

    /// Create a user, returning only its public fields
    pub async fn register(&self, new_user: NewUser) -> AuthResult<PublicUser> {
        validate_new_user(&new_user).map_err(AuthError::Validation)?;

        if self.store.email_exists(&new_user.email).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password_async(new_user.password).await?;
        let record = UserRecord {
            username: new_user.username,
            email: new_user.email,
            password_hash,
        };

        let user = self
            .store
            .insert_user(&record)
            .await
            .map_err(|e| match e {
                // A concurrent registration won the race on one of the unique columns
                DatabaseError::Conflict(constraint) if constraint.contains("email") => {
                    AuthError::EmailTaken
                }
                DatabaseError::Conflict(_) => AuthError::UsernameTaken,
                other => AuthError::Store(other),
            })?;

        info!("Registered user {}", user.id);
        Ok(user.public())
    }

    /// Exchange credentials for a session token
    ///
    /// Unknown email and wrong password both end in
    /// [`AuthError::InvalidCredentials`] after the same amount of hashing work.
    pub async fn login(&self, credentials: LoginCredentials) -> AuthResult<String> {
        let user = self.store.find_user_by_email(&credentials.email).await?;
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());

        let verified = verify_password_async(credentials.password, stored_hash).await?;

        let user = match user {
            Some(user) if verified => user,
            _ => return Err(AuthError::InvalidCredentials),
        };

        self.jwt.generate_token(user.id).map_err(|e| {
            error!("Failed to sign session token: {}", e);
            AuthError::Token(e)
        })
    }

    /// Decode a bearer token
    ///
    /// `None` or an empty token is unauthenticated; a bad signature or an
    /// expired token is forbidden.
    pub fn authenticate(&self, token: Option<&str>) -> AuthResult<Claims> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::MissingToken),
        };

        self.jwt.validate_token(token).map_err(|e| {
            warn!("Failed to validate token: {}", e);
            AuthError::InvalidToken
        })
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use crate::store::MemoryCredentialStore;

    fn authenticator(store: MemoryCredentialStore) -> Authenticator {
        let jwt = JwtService::new(JwtConfig {
            secret: "unit-test-secret".to_string(),
            token_expiry: 3600,
        });
        Authenticator::new(Arc::new(store), jwt)
    }

    fn alice() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn test_api_key_classification() {
        let auth = authenticator(MemoryCredentialStore::new().with_api_key("known-key"));

        assert!(matches!(
            auth.validate_api_key(None).await,
            Err(AuthError::NoApiKey)
        ));
        assert!(matches!(
            auth.validate_api_key(Some("")).await,
            Err(AuthError::NoApiKey)
        ));
        assert!(matches!(
            auth.validate_api_key(Some("other-key")).await,
            Err(AuthError::InvalidApiKey)
        ));
        assert!(auth.validate_api_key(Some("known-key")).await.is_ok());
    }

    #[tokio::test]
    async fn test_api_key_is_looked_up_on_every_call() {
        let store = MemoryCredentialStore::new().with_api_key("known-key");
        let auth = authenticator(store.clone());

        auth.validate_api_key(Some("known-key")).await.unwrap();
        auth.validate_api_key(Some("known-key")).await.unwrap();
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn test_register_returns_public_fields_and_rejects_duplicate_email() {
        let store = MemoryCredentialStore::new();
        let auth = authenticator(store.clone());

        let user = auth.register(alice()).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");

        let mut again = alice();
        again.username = "alice_two".to_string();
        assert!(matches!(
            auth.register(again).await,
            Err(AuthError::EmailTaken)
        ));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_username() {
        let store = MemoryCredentialStore::new();
        let auth = authenticator(store.clone());

        auth.register(alice()).await.unwrap();
        let mut again = alice();
        again.email = "other@example.com".to_string();

        assert!(matches!(
            auth.register(again).await,
            Err(AuthError::UsernameTaken)
        ));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_register_validates_input_before_touching_store() {
        let store = MemoryCredentialStore::new();
        let auth = authenticator(store.clone());

        let mut bad = alice();
        bad.email = "nope".to_string();

        assert!(matches!(
            auth.register(bad).await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn test_login_issues_token_for_registered_user() {
        let auth = authenticator(MemoryCredentialStore::new());
        let user = auth.register(alice()).await.unwrap();

        let token = auth
            .login(LoginCredentials {
                email: "alice@example.com".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();

        let claims = auth.authenticate(Some(&token)).unwrap();
        assert_eq!(claims.user_id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let auth = authenticator(MemoryCredentialStore::new());
        auth.register(alice()).await.unwrap();

        let unknown = auth
            .login(LoginCredentials {
                email: "nobody@example.com".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap_err();
        let wrong = auth
            .login(LoginCredentials {
                email: "alice@example.com".to_string(),
                password: "wrong password".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[test]
    fn test_authenticate_classification() {
        let auth = authenticator(MemoryCredentialStore::new());

        assert!(matches!(
            auth.authenticate(None),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(Some("  ")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(Some("forged.token.value")),
            Err(AuthError::InvalidToken)
        ));
    }
}
