//! Client configuration.

use std::time::Duration;

/// Production API root.
pub const DEFAULT_API_BASE_URL: &str = "https://investpro-company.com/api";

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Configuration shared by the customer and admin clients.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Root for customer requests.
    pub api_base_url: String,
    /// Root for admin requests.
    pub admin_api_base_url: String,
    pub request_timeout: Duration,
    /// Path of the token refresh endpoint. `None` disables refresh-on-401.
    pub refresh_endpoint: Option<String>,
}

impl ClientConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                        | Default                             |
    /// |---------------------------------|-------------------------------------|
    /// | `INVESTPRO_API_BASE_URL`        | `https://investpro-company.com/api` |
    /// | `INVESTPRO_ADMIN_API_BASE_URL`  | customer base URL                   |
    /// | `INVESTPRO_REQUEST_TIMEOUT_MS`  | `30000`                             |
    /// | `INVESTPRO_REFRESH_ENDPOINT`    | unset                               |
    pub fn from_env() -> Self {
        let api_base_url = non_empty_var("INVESTPRO_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.into());
        Self {
            admin_api_base_url: non_empty_var("INVESTPRO_ADMIN_API_BASE_URL")
                .unwrap_or_else(|| api_base_url.clone()),
            api_base_url,
            request_timeout: non_empty_var("INVESTPRO_REQUEST_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            refresh_endpoint: non_empty_var("INVESTPRO_REFRESH_ENDPOINT"),
        }
    }

    /// Point both scopes at `url`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.admin_api_base_url = url.clone();
        self.api_base_url = url;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            admin_api_base_url: DEFAULT_API_BASE_URL.into(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            refresh_endpoint: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
