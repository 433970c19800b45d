// @zen-component: SESSION-TokenStore
//
//! Scope-keyed token persistence.
//!
//! At most one scope holds a token pair at any observable instant. `set`
//! removes the other scope's keys in the same atomic batch that writes the
//! new pair.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::models::auth::TokenPair;
use crate::scope::Scope;
use crate::storage::{KeyValueStore, StorageError, StorageOp};

/// Storage keys for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageKeys {
    pub access: &'static str,
    pub refresh: &'static str,
}

const CUSTOMER_KEYS: StorageKeys = StorageKeys {
    access: "access",
    refresh: "refresh",
};

const ADMIN_KEYS: StorageKeys = StorageKeys {
    access: "admin_access",
    refresh: "admin_refresh",
};

/// Keys under which `scope` persists its pair. Stable across releases.
pub fn storage_keys(scope: Scope) -> StorageKeys {
    match scope {
        Scope::Customer => CUSTOMER_KEYS,
        Scope::Admin => ADMIN_KEYS,
    }
}

fn removals(scope: Scope) -> [StorageOp; 2] {
    let keys = storage_keys(scope);
    [StorageOp::remove(keys.access), StorageOp::remove(keys.refresh)]
}

/// Owner of every persisted token pair.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The pair stored for `scope`; both halves must be present and non-empty.
    pub fn get(&self, scope: Scope) -> Result<Option<TokenPair>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.read(scope)
    }

    /// Stored access token only.
    pub fn access_token(&self, scope: Scope) -> Result<Option<String>, StorageError> {
        Ok(self.get(scope)?.map(|p| p.access))
    }

    /// Stored refresh token only.
    pub fn refresh_token(&self, scope: Scope) -> Result<Option<String>, StorageError> {
        Ok(self.get(scope)?.map(|p| p.refresh))
    }

    /// Write `pair` for `scope`, erasing every other scope in the same batch.
    pub fn set(&self, scope: Scope, pair: &TokenPair) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let keys = storage_keys(scope);
        let mut ops: Vec<StorageOp> = Scope::ALL
            .into_iter()
            .filter(|s| *s != scope)
            .flat_map(removals)
            .collect();
        ops.push(StorageOp::put(keys.access, &pair.access));
        ops.push(StorageOp::put(keys.refresh, &pair.refresh));
        self.store.apply(&ops)?;
        debug!(scope = %scope, "tokens stored");
        Ok(())
    }

    /// Remove `scope`'s pair. Clearing an empty scope is a no-op.
    pub fn clear(&self, scope: Scope) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        match self.has_any_key(scope) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            // The removal batch rewrites unreadable storage.
            Err(StorageError::Corrupt(reason)) => {
                warn!(scope = %scope, %reason, "token storage unreadable, resetting");
            }
            Err(e) => return Err(e),
        }
        self.store.apply(&removals(scope))?;
        debug!(scope = %scope, "tokens cleared");
        Ok(())
    }

    /// The scope currently holding a pair. Admin wins if both do.
    pub fn active_scope(&self) -> Result<Option<Scope>, StorageError> {
        Ok(self.populated_scopes()?.into_iter().next())
    }

    /// Every scope holding a pair, read under one lock, admin first.
    pub fn populated_scopes(&self) -> Result<Vec<Scope>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut scopes = Vec::new();
        for scope in Scope::ALL {
            if self.read(scope)?.is_some() {
                scopes.push(scope);
            }
        }
        Ok(scopes)
    }

    /// Swap in a refreshed access token.
    ///
    /// Returns `false` without writing if the scope no longer holds a pair,
    /// so a refresh finishing after a logout cannot resurrect credentials.
    pub fn replace_access(&self, scope: Scope, access: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        if self.read(scope)?.is_none() {
            return Ok(false);
        }
        self.store
            .apply(&[StorageOp::put(storage_keys(scope).access, access)])?;
        debug!(scope = %scope, "access token replaced");
        Ok(true)
    }

    fn read(&self, scope: Scope) -> Result<Option<TokenPair>, StorageError> {
        let keys = storage_keys(scope);
        let access = self.store.get(keys.access)?.filter(|v| !v.is_empty());
        let refresh = self.store.get(keys.refresh)?.filter(|v| !v.is_empty());
        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair { access, refresh }),
            _ => None,
        })
    }

    /// True when any key of the scope exists, even half a pair.
    fn has_any_key(&self, scope: Scope) -> Result<bool, StorageError> {
        let keys = storage_keys(scope);
        Ok(self.store.get(keys.access)?.is_some() || self.store.get(keys.refresh)?.is_some())
    }
}
