// @zen-component: SESSION-Orchestrator
//
//! Session state machine.
//!
//! Owns the in-memory [`Session`], drives the [`AuthBackend`], writes the
//! [`TokenStore`] and reacts to [`InvalidationBus`] events.
//!
//! Every login and restoration captures the epoch it started under.
//! Invalidation, logout and newer logins bump the epoch, and a completion is
//! applied only if its epoch is still current. An invalidation therefore
//! always wins over a success that resolves after it, whatever order the
//! futures complete in.
//!
//! The state mutex is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::{Phase, Session};
use crate::auth::bus::{InvalidationBus, Subscription};
use crate::auth::token_store::TokenStore;
use crate::auth::{AuthBackend, AuthError};
use crate::models::auth::{Credentials, TokenPair, UserProfile};
use crate::scope::Scope;
use crate::storage::StorageError;

/// Pause between restoration retries, multiplied by the attempt number.
const RESTORE_RETRY_STEP: Duration = Duration::from_millis(200);

struct State {
    session: Session,
    epoch: u64,
    booted: bool,
}

impl State {
    fn is_current(&self, attempt: u64, scope: Scope) -> bool {
        self.epoch == attempt && self.session.scope == Some(scope)
    }
}

/// State shared with the bus handler.
struct Shared {
    state: Mutex<State>,
    tokens: TokenStore,
    notify: watch::Sender<Session>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Every transition is a single assignment, so a poisoned guard still
        // holds a consistent session.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, state: &mut State, next: Session) {
        debug!(phase = ?next.phase, scope = ?next.scope, "session transition");
        state.session = next.clone();
        self.notify.send_replace(next);
    }

    fn clear_tokens(&self, scope: Scope) {
        if let Err(e) = self.tokens.clear(scope) {
            warn!(scope = %scope, error = %e, "failed to clear stored tokens");
        }
    }

    fn handle_invalidation(&self, scope: Scope) {
        let mut state = self.lock();
        if state.session.active_scope() != Some(scope) {
            debug!(scope = %scope, "ignoring invalidation for inactive scope");
            return;
        }
        state.epoch += 1;
        self.clear_tokens(scope);
        self.transition(&mut state, Session::unauthenticated());
        info!(scope = %scope, "session invalidated by backend");
    }
}

/// Decides which scope is active and as whom.
///
/// Construct one per application; it subscribes to the bus exactly once and
/// unsubscribes when dropped.
pub struct SessionOrchestrator {
    shared: Arc<Shared>,
    backend: Arc<dyn AuthBackend>,
    bus: InvalidationBus,
    config: SessionConfig,
    _subscription: Subscription,
}

impl SessionOrchestrator {
    pub fn new(
        tokens: TokenStore,
        backend: Arc<dyn AuthBackend>,
        bus: InvalidationBus,
        config: SessionConfig,
    ) -> Self {
        let (notify, _) = watch::channel(Session::booting());
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                session: Session::booting(),
                epoch: 0,
                booted: false,
            }),
            tokens,
            notify,
        });

        let weak = Arc::downgrade(&shared);
        let subscription = bus.subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_invalidation(event.scope);
            }
        });

        Self {
            shared,
            backend,
            bus,
            config,
            _subscription: subscription,
        }
    }

    /// Current snapshot.
    pub fn session(&self) -> Session {
        self.shared.lock().session.clone()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.shared.notify.subscribe()
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.shared.tokens
    }

    // -------------------------------------------------------------------------
    // Boot
    // -------------------------------------------------------------------------

    /// Restore the persisted session, if any.
    ///
    /// Runs once; later calls return the current snapshot. Never fails:
    /// storage and network problems end in `Unauthenticated`.
    pub async fn boot(&self) -> Session {
        let (scope, attempt) = {
            let mut state = self.shared.lock();
            if state.booted || state.session.phase != Phase::Booting {
                state.booted = true;
                return state.session.clone();
            }
            state.booted = true;

            let populated = match self.shared.tokens.populated_scopes() {
                Ok(populated) => populated,
                Err(e) => {
                    warn!(error = %e, "token storage unavailable, starting unauthenticated");
                    if matches!(e, StorageError::Corrupt(_)) {
                        for scope in Scope::ALL {
                            self.shared.clear_tokens(scope);
                        }
                    }
                    self.shared.transition(&mut state, Session::unauthenticated());
                    return state.session.clone();
                }
            };

            // Drops a second full pair as well as half pairs left behind.
            let chosen = populated.first().copied();
            for stale in Scope::ALL.into_iter().filter(|s| Some(*s) != chosen) {
                if populated.contains(&stale) {
                    warn!(scope = %stale, "two scopes stored, dropping one");
                }
                self.shared.clear_tokens(stale);
            }

            let Some(scope) = chosen else {
                debug!("no stored session");
                self.shared.transition(&mut state, Session::unauthenticated());
                return state.session.clone();
            };

            state.epoch += 1;
            self.shared
                .transition(&mut state, Session::pending(scope, Phase::Restoring));
            (scope, state.epoch)
        };

        info!(scope = %scope, "restoring stored session");
        let result = self.restore_profile(scope, attempt).await;

        let mut state = self.shared.lock();
        if !state.is_current(attempt, scope) {
            debug!(scope = %scope, "discarding stale restoration result");
            return state.session.clone();
        }
        match result {
            Ok(user) => {
                info!(scope = %scope, user_id = user.id, "session restored");
                self.shared
                    .transition(&mut state, Session::authenticated(scope, user));
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "restoration failed, clearing stored tokens");
                self.shared.clear_tokens(scope);
                self.shared.transition(&mut state, Session::unauthenticated());
            }
        }
        state.session.clone()
    }

    async fn restore_profile(&self, scope: Scope, attempt: u64) -> Result<UserProfile, AuthError> {
        let mut retry = 0;
        loop {
            match self.backend.fetch_profile(scope).await {
                Err(e) if e.is_network() && retry < self.config.restore_network_retries => {
                    retry += 1;
                    warn!(scope = %scope, retry, error = %e, "profile fetch failed, retrying");
                    tokio::time::sleep(RESTORE_RETRY_STEP * retry).await;
                    if !self.shared.lock().is_current(attempt, scope) {
                        return Err(AuthError::Superseded { scope });
                    }
                }
                other => return other,
            }
        }
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    pub async fn login_customer(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        self.login(Scope::Customer, Credentials::new(email, password))
            .await
    }

    pub async fn login_admin(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        self.login(Scope::Admin, Credentials::new(email, password))
            .await
    }

    /// Authenticate in `scope`.
    ///
    /// Clears the other scope first. Errors go back to the caller and leave
    /// the session `Unauthenticated`, unless `scope` was already
    /// authenticated, in which case that session stays. Nothing is retried. A login overtaken
    /// by an invalidation, a logout or a newer login returns
    /// [`AuthError::Superseded`].
    pub async fn login(
        &self,
        scope: Scope,
        credentials: Credentials,
    ) -> Result<UserProfile, AuthError> {
        let (attempt, previous) = {
            let mut state = self.shared.lock();
            state.booted = true;
            let previous = state.session.clone();
            state.epoch += 1;
            if let Err(e) = self.shared.tokens.clear(scope.other()) {
                self.shared.transition(&mut state, Session::unauthenticated());
                return Err(e.into());
            }
            self.shared
                .transition(&mut state, Session::pending(scope, Phase::Authenticating));
            (state.epoch, previous)
        };

        info!(scope = %scope, email = %credentials.email, "login started");
        let result = self.backend.login(scope, &credentials).await;

        let mut state = self.shared.lock();
        if !state.is_current(attempt, scope) {
            warn!(scope = %scope, "login finished after being superseded, discarding result");
            return Err(AuthError::Superseded { scope });
        }

        match result {
            Ok((tokens, user)) => {
                if let Err(e) = self.shared.tokens.set(scope, &tokens) {
                    warn!(scope = %scope, error = %e, "could not persist tokens");
                    self.shared.transition(&mut state, Session::unauthenticated());
                    return Err(e.into());
                }
                info!(scope = %scope, user_id = user.id, "login succeeded");
                self.shared
                    .transition(&mut state, Session::authenticated(scope, user.clone()));
                Ok(user)
            }
            Err(e) if previous.is_authenticated() && previous.scope == Some(scope) => {
                info!(scope = %scope, error = %e, "login failed, keeping current session");
                self.shared.transition(&mut state, previous);
                Err(e)
            }
            Err(e) => {
                info!(scope = %scope, error = %e, "login failed");
                self.shared.clear_tokens(scope);
                self.shared.transition(&mut state, Session::unauthenticated());
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    /// End the session.
    ///
    /// Storage and state are torn down before the server is contacted, so
    /// the caller observes `Unauthenticated` as soon as this returns even if
    /// the server call fails or times out.
    pub async fn logout(&self) {
        let captured = {
            let mut state = self.shared.lock();
            state.booted = true;
            state.epoch += 1;

            let scope = state
                .session
                .active_scope()
                .or_else(|| self.shared.tokens.active_scope().ok().flatten());

            let captured = scope.map(|scope| {
                let tokens = self.shared.tokens.get(scope).unwrap_or_else(|e| {
                    warn!(scope = %scope, error = %e, "could not read tokens for server logout");
                    None
                });
                self.shared.clear_tokens(scope);
                (scope, tokens)
            });

            if state.session.phase != Phase::Unauthenticated {
                self.shared.transition(&mut state, Session::unauthenticated());
            }
            captured
        };

        let Some((scope, tokens)) = captured else {
            debug!("logout without an active session");
            return;
        };
        info!(scope = %scope, "logged out locally");

        match tokens {
            Some(tokens) if self.backend.supports_server_logout(scope) => {
                self.server_logout(scope, tokens).await;
            }
            _ => debug!(scope = %scope, "skipping server logout"),
        }
    }

    async fn server_logout(&self, scope: Scope, tokens: TokenPair) {
        match tokio::time::timeout(self.config.logout_timeout, self.backend.logout(scope, &tokens))
            .await
        {
            Ok(Ok(())) => debug!(scope = %scope, "server logout acknowledged"),
            Ok(Err(e)) => warn!(scope = %scope, error = %e, "server logout failed, ignoring"),
            Err(_) => warn!(
                scope = %scope,
                timeout_ms = self.config.logout_timeout.as_millis() as u64,
                "server logout timed out, ignoring"
            ),
        }
    }
}
