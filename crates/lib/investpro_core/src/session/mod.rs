//! In-memory session state and the orchestrator that owns it.

pub mod config;
pub mod orchestrator;

use std::fmt;

use serde::Serialize;

use crate::models::auth::UserProfile;
use crate::scope::Scope;

/// Lifecycle phase of the in-memory session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Application start, storage not read yet.
    Booting,
    Unauthenticated,
    /// A login call is in flight.
    Authenticating,
    Authenticated,
    /// A stored token is being confirmed by a profile fetch.
    Restoring,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Booting => "booting",
            Phase::Unauthenticated => "unauthenticated",
            Phase::Authenticating => "authenticating",
            Phase::Authenticated => "authenticated",
            Phase::Restoring => "restoring",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of "who am I".
///
/// Derived from the token store plus a live profile fetch; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub scope: Option<Scope>,
    pub user: Option<UserProfile>,
    pub phase: Phase,
}

impl Session {
    pub fn booting() -> Self {
        Self {
            scope: None,
            user: None,
            phase: Phase::Booting,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            scope: None,
            user: None,
            phase: Phase::Unauthenticated,
        }
    }

    pub(crate) fn pending(scope: Scope, phase: Phase) -> Self {
        Self {
            scope: Some(scope),
            user: None,
            phase,
        }
    }

    pub(crate) fn authenticated(scope: Scope, user: UserProfile) -> Self {
        Self {
            scope: Some(scope),
            user: Some(user),
            phase: Phase::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated && self.user.is_some()
    }

    /// Authenticated in the admin scope, or as a staff user.
    pub fn is_admin(&self) -> bool {
        self.is_authenticated()
            && (self.scope == Some(Scope::Admin)
                || self.user.as_ref().is_some_and(UserProfile::is_admin))
    }

    /// Some operation is still deciding the outcome.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.phase,
            Phase::Booting | Phase::Authenticating | Phase::Restoring
        )
    }

    /// The scope whose invalidation would end this session.
    pub fn active_scope(&self) -> Option<Scope> {
        match self.phase {
            Phase::Booting | Phase::Unauthenticated => None,
            _ => self.scope,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::booting()
    }
}
