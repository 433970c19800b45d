//! Authentication building blocks.
//!
//! - [`token_store`] - scope-keyed token persistence with mutual exclusion
//! - [`bus`] - process-wide invalidation broadcast
//! - [`AuthBackend`] - the per-scope login/profile/logout boundary

pub mod bus;
pub mod token_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{Credentials, TokenPair, UserProfile};
use crate::scope::Scope;
use crate::storage::StorageError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend rejected the credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    /// A previously issued token was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// The attempt was overtaken by an invalidation, a logout or a newer login.
    #[error("Superseded: {scope} session attempt was discarded")]
    Superseded { scope: Scope },

    /// The backend answered with something we could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl AuthError {
    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

/// Per-scope login, profile and logout calls.
///
/// Implementations are pure request/response boundaries: they never touch
/// the token store or the session.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for a token pair and the user profile.
    async fn login(
        &self,
        scope: Scope,
        credentials: &Credentials,
    ) -> Result<(TokenPair, UserProfile), AuthError>;

    /// Fetch the profile using the scope's stored access token.
    async fn fetch_profile(&self, scope: Scope) -> Result<UserProfile, AuthError>;

    /// Best-effort server-side logout for tokens that were just removed locally.
    async fn logout(&self, scope: Scope, tokens: &TokenPair) -> Result<(), AuthError>;

    /// Whether the backend exposes a logout endpoint for `scope`.
    fn supports_server_logout(&self, scope: Scope) -> bool {
        scope == Scope::Customer
    }
}
