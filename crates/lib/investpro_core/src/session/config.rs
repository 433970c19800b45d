//! Orchestrator configuration.

use std::time::Duration;

/// Default bound on the best-effort server logout call.
pub const DEFAULT_LOGOUT_TIMEOUT_MS: u64 = 5_000;

/// Tuning knobs for [`super::orchestrator::SessionOrchestrator`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Extra profile-fetch attempts during boot restoration when the failure
    /// is a network error. `0` clears the stored tokens on the first failure.
    pub restore_network_retries: u32,
    /// Upper bound for the server-side logout call. Local teardown never
    /// waits on it.
    pub logout_timeout: Duration,
}

impl SessionConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                      | Default |
    /// |-------------------------------|---------|
    /// | `INVESTPRO_RESTORE_RETRIES`   | `0`     |
    /// | `INVESTPRO_LOGOUT_TIMEOUT_MS` | `5000`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            restore_network_retries: std::env::var("INVESTPRO_RESTORE_RETRIES")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.restore_network_retries),
            logout_timeout: std::env::var("INVESTPRO_LOGOUT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.logout_timeout),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restore_network_retries: 0,
            logout_timeout: Duration::from_millis(DEFAULT_LOGOUT_TIMEOUT_MS),
        }
    }
}
