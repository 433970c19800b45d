// @zen-component: SESSION-ApiClient
//
//! Scoped HTTP client.
//!
//! Non-public requests carry `Authorization: Bearer <access>` read from the
//! [`TokenStore`] at send time. A 401 on such a request triggers at most one
//! refresh-and-retry; if that is not possible the scope's tokens are cleared
//! and an invalidation is published on the [`InvalidationBus`].

use std::collections::HashSet;
use std::time::Duration;

use investpro_core::{InvalidationBus, Scope, TokenStore};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::public_paths;
use crate::config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::envelope::{Envelope, error_message};
use crate::error::ApiError;

/// Which access token a request carries.
#[derive(Debug, Clone, Copy)]
pub enum Bearer<'a> {
    /// The scope's stored token. A 401 refreshes or invalidates.
    Stored,
    /// A token the caller holds outside storage. A 401 is only reported.
    Explicit(&'a str),
}

/// HTTP client bound to one [`Scope`].
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    scope: Scope,
    base_url: Url,
    public_paths: HashSet<String>,
    refresh_endpoint: Option<String>,
    tokens: TokenStore,
    bus: InvalidationBus,
}

impl ApiClient {
    pub fn new(
        scope: Scope,
        base_url: &str,
        tokens: TokenStore,
        bus: InvalidationBus,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_http(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))?,
            scope,
            base_url: normalize_base_url(base_url)?,
            public_paths: HashSet::new(),
            refresh_endpoint: None,
            tokens,
            bus,
        })
    }

    /// Client for `scope` with the base URL, timeout, refresh endpoint and
    /// public paths that scope uses.
    pub fn from_config(
        scope: Scope,
        config: &ClientConfig,
        tokens: TokenStore,
        bus: InvalidationBus,
    ) -> Result<Self, ApiError> {
        let base_url = match scope {
            Scope::Customer => &config.api_base_url,
            Scope::Admin => &config.admin_api_base_url,
        };
        Ok(Self::new(scope, base_url, tokens, bus)?
            .with_timeout(config.request_timeout)?
            .with_public_paths(public_paths(scope).iter().copied())
            .with_refresh_endpoint(config.refresh_endpoint.clone()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ApiError> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    /// Paths sent without a bearer token and exempt from 401 handling.
    pub fn with_public_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.public_paths = paths
            .into_iter()
            .map(|p| normalize_path(p.as_ref()).to_string())
            .collect();
        self
    }

    pub fn with_refresh_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.refresh_endpoint = endpoint
            .map(|e| normalize_path(&e).to_string())
            .filter(|e| !e.is_empty());
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(normalize_path(path))
    }

    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(normalize_path(path))?)
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    /// `GET path` and return the envelope's `data`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (status, body) = self.send(Method::GET, path, None, Bearer::Stored).await?;
        decode(status, &body)
    }

    /// `GET path` with a token that is not (yet) in storage.
    pub async fn get_with_token<T: DeserializeOwned>(
        &self,
        path: &str,
        access: &str,
    ) -> Result<T, ApiError> {
        let (status, body) = self
            .send(Method::GET, path, None, Bearer::Explicit(access))
            .await?;
        decode(status, &body)
    }

    /// `POST path` with a JSON body and return the envelope's `data`.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        let (status, bytes) = self
            .send(Method::POST, path, Some(&body), Bearer::Stored)
            .await?;
        decode(status, &bytes)
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    /// Send one request and return the raw success body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Bearer<'_>,
    ) -> Result<(StatusCode, Vec<u8>), ApiError> {
        let url = self.url(path)?;
        let public = self.is_public(path);
        let mut refreshed = false;

        loop {
            let token = match bearer {
                _ if public => None,
                Bearer::Stored => self.tokens.access_token(self.scope)?,
                Bearer::Explicit(token) => Some(token.to_string()),
            };

            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(scope = %self.scope, method = %method, path, "api request");
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            if status.is_success() {
                return Ok((status, bytes.to_vec()));
            }

            let message = error_message(&bytes)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").into());
            if status != StatusCode::UNAUTHORIZED {
                debug!(scope = %self.scope, status = status.as_u16(), path, "api error");
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            if public || matches!(bearer, Bearer::Explicit(_)) {
                return Err(ApiError::Unauthorized(message));
            }
            if !refreshed && self.try_refresh().await {
                refreshed = true;
                continue;
            }

            self.invalidate();
            return Err(ApiError::Unauthorized(message));
        }
    }

    async fn try_refresh(&self) -> bool {
        let Some(endpoint) = self.refresh_endpoint.as_deref() else {
            return false;
        };
        match self.refresh_access(endpoint).await {
            Ok(true) => {
                info!(scope = %self.scope, "access token refreshed");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(scope = %self.scope, error = %e, "token refresh failed");
                false
            }
        }
    }

    /// `Ok(false)` when there is no refresh token to send, or the tokens were
    /// cleared while the refresh was in flight.
    async fn refresh_access(&self, endpoint: &str) -> Result<bool, ApiError> {
        let Some(refresh) = self.tokens.refresh_token(self.scope)? else {
            return Ok(false);
        };
        let response = self
            .http
            .post(self.url(endpoint)?)
            .json(&json!({ "refresh": refresh }))
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&bytes).unwrap_or_default(),
            });
        }
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        let access = extract_access(&value)
            .ok_or_else(|| ApiError::Decode("refresh response has no access token".into()))?;
        Ok(self.tokens.replace_access(self.scope, &access)?)
    }

    fn invalidate(&self) {
        if let Err(e) = self.tokens.clear(self.scope) {
            warn!(scope = %self.scope, error = %e, "failed to clear rejected tokens");
        }
        info!(scope = %self.scope, "credentials rejected, publishing invalidation");
        self.bus.publish(self.scope);
    }
}

fn build_http(timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Parse an envelope and return its `data`; `success: false` is an error.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, ApiError> {
    let envelope: Envelope<T> = Envelope::parse(body)?;
    if !envelope.success {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(body).unwrap_or_else(|| "Request was not successful".into()),
        });
    }
    envelope.into_data()
}

/// Refresh responses carry `access` at the top level or inside `data`.
fn extract_access(value: &Value) -> Option<String> {
    value
        .get("access")
        .or_else(|| value.get("data").and_then(|d| d.get("access")))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Exactly one trailing slash, so relative joins append.
fn normalize_base_url(raw: &str) -> Result<Url, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    Ok(Url::parse(&format!("{trimmed}/"))?)
}

fn normalize_path(path: &str) -> &str {
    path.trim().trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use investpro_core::storage::MemoryStore;
    use std::sync::Arc;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(
            Scope::Customer,
            base,
            TokenStore::new(Arc::new(MemoryStore::new())),
            InvalidationBus::new(),
        )
        .unwrap()
    }

    #[test]
    fn base_url_gets_exactly_one_trailing_slash() {
        assert_eq!(
            client("https://investpro-company.com/api").base_url().as_str(),
            "https://investpro-company.com/api/"
        );
        assert_eq!(
            client("https://investpro-company.com/api///").base_url().as_str(),
            "https://investpro-company.com/api/"
        );
    }

    #[test]
    fn paths_join_under_the_base() {
        let c = client("http://localhost:8000/api");
        assert_eq!(
            c.url("/customer/profile/").unwrap().as_str(),
            "http://localhost:8000/api/customer/profile/"
        );
        assert_eq!(
            c.url("customer/profile/").unwrap().as_str(),
            "http://localhost:8000/api/customer/profile/"
        );
    }

    #[test]
    fn public_paths_ignore_leading_slash() {
        let c = client("http://localhost/api").with_public_paths(["/customer/login/"]);
        assert!(c.is_public("customer/login/"));
        assert!(c.is_public("/customer/login/"));
        assert!(!c.is_public("customer/profile/"));
    }

    #[test]
    fn blank_refresh_endpoint_disables_refresh() {
        let c = client("http://localhost/api").with_refresh_endpoint(Some("  ".into()));
        assert!(c.refresh_endpoint.is_none());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = ApiClient::new(
            Scope::Admin,
            "not a url",
            TokenStore::new(Arc::new(MemoryStore::new())),
            InvalidationBus::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[test]
    fn access_is_found_at_top_level_or_in_data() {
        assert_eq!(
            extract_access(&json!({ "access": "a1" })).as_deref(),
            Some("a1")
        );
        assert_eq!(
            extract_access(&json!({ "success": true, "data": { "access": "a2" } })).as_deref(),
            Some("a2")
        );
        assert!(extract_access(&json!({ "data": {} })).is_none());
    }

    #[test]
    fn unsuccessful_envelope_is_status_error() {
        let body = br#"{"success":false,"message":"Account locked","data":null}"#;
        let err = decode::<Value>(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 200, message } if message == "Account locked"));
    }
}
