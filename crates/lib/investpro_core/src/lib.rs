//! # investpro_core
//!
//! Session orchestration for InvestPro.
//!
//! Decides which of the two mutually-exclusive authentication scopes
//! (customer or admin) is active, persists that decision in a key/value
//! store, restores it at boot and tears it down when the backend rejects a
//! token.

pub mod auth;
pub mod models;
pub mod scope;
pub mod session;
pub mod storage;

pub use auth::bus::{InvalidationBus, InvalidationEvent, Subscription};
pub use auth::token_store::TokenStore;
pub use auth::{AuthBackend, AuthError};
pub use models::auth::{Credentials, LoginData, TokenPair, UserProfile};
pub use scope::Scope;
pub use session::config::SessionConfig;
pub use session::orchestrator::SessionOrchestrator;
pub use session::{Phase, Session};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
