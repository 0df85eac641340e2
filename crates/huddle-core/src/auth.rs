//! Handshake authentication.
//!
//! Credentials are issued and verified elsewhere; the coordinator only asks an
//! [`Authenticator`] to turn a bearer token into a user ID. [`authenticate`]
//! is the handshake interceptor: it runs once per connection, before any room
//! event, and either binds an [`Identity`] or rejects the connection.

use crate::connection::{Identity, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token was presented but is not valid.
    #[error("Invalid credential")]
    InvalidToken,

    /// The authentication backend could not be reached.
    #[error("Authentication backend error: {0}")]
    Backend(String),
}

/// Resolves bearer tokens to user IDs.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a token to the user it was issued for.
    async fn resolve(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Resolve the identity for a new connection.
///
/// A missing or blank token binds [`Identity::Guest`]. A token that fails to
/// resolve rejects the handshake.
///
/// # Errors
///
/// Returns the resolver's error when a token is presented and rejected.
pub async fn authenticate(
    authenticator: &dyn Authenticator,
    token: Option<&str>,
) -> Result<Identity, AuthError> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        debug!("No credential presented, binding guest identity");
        return Ok(Identity::Guest);
    };

    match authenticator.resolve(token).await {
        Ok(user_id) => {
            debug!(user = %user_id, "Credential resolved");
            Ok(Identity::User(user_id))
        }
        Err(e) => {
            warn!(error = %e, "Handshake rejected");
            Err(e)
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

/// [`Authenticator`] backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, UserId>,
}

impl TokenTable {
    /// Create an empty table. Every presented token is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the table has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, UserId)> for TokenTable {
    fn from_iter<I: IntoIterator<Item = (String, UserId)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authenticator for TokenTable {
    async fn resolve(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TokenTable {
        TokenTable::new().with_token("tok-alice", "alice")
    }

    #[tokio::test]
    async fn test_valid_token_binds_user() {
        let identity = authenticate(&table(), Some("tok-alice")).await.unwrap();
        assert_eq!(identity, Identity::user("alice"));
    }

    #[tokio::test]
    async fn test_missing_token_binds_guest() {
        assert_eq!(authenticate(&table(), None).await.unwrap(), Identity::Guest);
        assert_eq!(
            authenticate(&table(), Some("  ")).await.unwrap(),
            Identity::Guest
        );
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        assert!(matches!(
            authenticate(&table(), Some("forged")).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
