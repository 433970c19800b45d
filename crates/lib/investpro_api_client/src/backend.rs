//! [`AuthBackend`] over the InvestPro HTTP API.

use async_trait::async_trait;
use investpro_core::{
    AuthBackend, AuthError, Credentials, InvalidationBus, LoginData, Scope, TokenPair,
    TokenStore, UserProfile,
};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::{ApiClient, Bearer};
use crate::config::ClientConfig;
use crate::error::ApiError;

pub const CUSTOMER_LOGIN: &str = "customer/login/";
pub const CUSTOMER_PROFILE: &str = "customer/profile/";
pub const CUSTOMER_LOGOUT: &str = "customer/logout/";
pub const ADMIN_LOGIN: &str = "admin/login/";
pub const ADMIN_LOGOUT: &str = "admin/logout/";
/// The admin API has no profile endpoint; any authenticated admin GET
/// confirms the token.
pub const ADMIN_CHECK_PATH: &str = "admin/support-tickets/";

const CUSTOMER_PUBLIC_PATHS: &[&str] = &[
    "customer/login/",
    "customer/login",
    "customer/register/",
    "customer/register",
    "auth/login/",
    "auth/signup/",
];

const ADMIN_PUBLIC_PATHS: &[&str] = &["admin/login/", "admin/login"];

/// Paths that never carry a bearer token for `scope`.
pub fn public_paths(scope: Scope) -> &'static [&'static str] {
    match scope {
        Scope::Customer => CUSTOMER_PUBLIC_PATHS,
        Scope::Admin => ADMIN_PUBLIC_PATHS,
    }
}

/// Login, profile and logout calls for both scopes.
pub struct HttpAuthBackend {
    customer: ApiClient,
    admin: ApiClient,
    admin_server_logout: bool,
}

impl HttpAuthBackend {
    pub fn new(customer: ApiClient, admin: ApiClient) -> Self {
        Self {
            customer,
            admin,
            admin_server_logout: false,
        }
    }

    /// Both clients from one config, sharing the token store and bus.
    pub fn from_config(
        config: &ClientConfig,
        tokens: TokenStore,
        bus: InvalidationBus,
    ) -> Result<Self, ApiError> {
        Ok(Self::new(
            ApiClient::from_config(Scope::Customer, config, tokens.clone(), bus.clone())?,
            ApiClient::from_config(Scope::Admin, config, tokens, bus)?,
        ))
    }

    /// Call `admin/logout/` on logout. Off by default.
    pub fn with_admin_server_logout(mut self, enabled: bool) -> Self {
        self.admin_server_logout = enabled;
        self
    }

    pub fn client(&self, scope: Scope) -> &ApiClient {
        match scope {
            Scope::Customer => &self.customer,
            Scope::Admin => &self.admin,
        }
    }

    async fn profile_with(&self, scope: Scope, bearer: Bearer<'_>) -> Result<UserProfile, ApiError> {
        let client = self.client(scope);
        match scope {
            Scope::Customer => {
                let (status, body) = client
                    .send(Method::GET, CUSTOMER_PROFILE, None, bearer)
                    .await?;
                decode_profile(status.as_u16(), &body)
            }
            Scope::Admin => {
                client.send(Method::GET, ADMIN_CHECK_PATH, None, bearer).await?;
                Ok(staff_profile("admin"))
            }
        }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(
        &self,
        scope: Scope,
        credentials: &Credentials,
    ) -> Result<(TokenPair, UserProfile), AuthError> {
        let path = match scope {
            Scope::Customer => CUSTOMER_LOGIN,
            Scope::Admin => ADMIN_LOGIN,
        };
        let data: LoginData = self
            .client(scope)
            .post(path, credentials)
            .await
            .map_err(login_error)?;
        let tokens = data.tokens();

        let user = match data.user {
            Some(user) => user,
            None => {
                debug!(scope = %scope, "login response has no user, fetching profile");
                let mut user = self
                    .profile_with(scope, Bearer::Explicit(&tokens.access))
                    .await?;
                if scope == Scope::Admin {
                    user.email = credentials.email.clone();
                    user.username = credentials.email.clone();
                }
                user
            }
        };
        Ok((tokens, user))
    }

    async fn fetch_profile(&self, scope: Scope) -> Result<UserProfile, AuthError> {
        Ok(self.profile_with(scope, Bearer::Stored).await?)
    }

    async fn logout(&self, scope: Scope, tokens: &TokenPair) -> Result<(), AuthError> {
        let (path, body) = match scope {
            Scope::Customer => (CUSTOMER_LOGOUT, Some(json!({ "refresh": tokens.refresh }))),
            Scope::Admin => (ADMIN_LOGOUT, None),
        };
        self.client(scope)
            .send(
                Method::POST,
                path,
                body.as_ref(),
                Bearer::Explicit(&tokens.access),
            )
            .await?;
        Ok(())
    }

    fn supports_server_logout(&self, scope: Scope) -> bool {
        match scope {
            Scope::Customer => true,
            Scope::Admin => self.admin_server_logout,
        }
    }
}

/// Rejected credentials come back as 400 or 401 on a public path.
fn login_error(e: ApiError) -> AuthError {
    match e {
        ApiError::Unauthorized(message) => AuthError::AuthenticationFailed(message),
        ApiError::Status { status, message } if (400..500).contains(&status) => {
            AuthError::AuthenticationFailed(message)
        }
        other => other.into(),
    }
}

fn decode_profile(status: u16, body: &[u8]) -> Result<UserProfile, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Status {
            status,
            message: crate::envelope::error_message(body)
                .unwrap_or_else(|| "Profile request was not successful".into()),
        });
    }
    // Some deployments return the user bare instead of inside the envelope.
    let user = value.get("data").cloned().unwrap_or(value);
    serde_json::from_value(user).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Profile standing in for an admin, whose API exposes no profile.
fn staff_profile(email: &str) -> UserProfile {
    let mut user = UserProfile::new(0, email);
    user.is_staff = true;
    user.is_superuser = true;
    user
}
