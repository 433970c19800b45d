//! HTTP client and backend against an in-process fake API.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use investpro_api_client::{ApiError, ClientConfig, HttpAuthBackend};
use investpro_core::storage::MemoryStore;
use investpro_core::{
    AuthBackend, AuthError, Credentials, InvalidationBus, Phase, Scope, SessionConfig,
    SessionOrchestrator, Subscription, TokenPair, TokenStore,
};
use serde_json::{Value, json};

// =============================================================================
// Fake API
// =============================================================================

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    authorization: Option<String>,
    body: Value,
}

#[derive(Default)]
struct FakeApi {
    requests: Mutex<Vec<Recorded>>,
}

impl FakeApi {
    fn record(&self, uri: &Uri, headers: &HeaderMap, body: Value) -> Option<String> {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            path: uri.path().to_string(),
            authorization: authorization.clone(),
            body,
        });
        authorization
    }

    fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

type Reply = (StatusCode, Json<Value>);

fn unauthorized() -> Reply {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Given token not valid for any token type" })),
    )
}

fn customer_user() -> Value {
    json!({
        "id": 42,
        "email": "jane@example.com",
        "username": "jane",
        "full_name": "Jane Doe",
        "balance": "1500.00",
        "is_kyc_verified": true
    })
}

async fn customer_login(
    State(api): State<Arc<FakeApi>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    api.record(&uri, &headers, body.clone());
    if body["password"] != "secret" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Invalid email or password",
                "errors": { "non_field_errors": ["Unable to log in."] }
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Login successful",
            "data": { "access": "cust-access", "refresh": "cust-refresh", "user": customer_user() }
        })),
    )
}

async fn customer_profile(
    State(api): State<Arc<FakeApi>>,
    uri: Uri,
    headers: HeaderMap,
) -> Reply {
    match api.record(&uri, &headers, Value::Null).as_deref() {
        Some("Bearer cust-access") | Some("Bearer refreshed-access") => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "", "data": customer_user() })),
        ),
        _ => unauthorized(),
    }
}

async fn customer_transactions(
    State(api): State<Arc<FakeApi>>,
    uri: Uri,
    headers: HeaderMap,
) -> Reply {
    api.record(&uri, &headers, Value::Null);
    unauthorized()
}

async fn customer_logout(
    State(api): State<Arc<FakeApi>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    api.record(&uri, &headers, body);
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Logged out" })),
    )
}

async fn admin_login(
    State(api): State<Arc<FakeApi>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    api.record(&uri, &headers, body);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Login successful",
            "data": { "access": "admin-access", "refresh": "admin-refresh" }
        })),
    )
}

async fn admin_tickets(State(api): State<Arc<FakeApi>>, uri: Uri, headers: HeaderMap) -> Reply {
    match api.record(&uri, &headers, Value::Null).as_deref() {
        Some("Bearer admin-access") => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "", "data": [] })),
        ),
        _ => unauthorized(),
    }
}

async fn token_refresh(
    State(api): State<Arc<FakeApi>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    api.record(&uri, &headers, body.clone());
    if body["refresh"] == "cust-refresh" {
        (StatusCode::OK, Json(json!({ "access": "refreshed-access" })))
    } else {
        unauthorized()
    }
}

async fn spawn_api() -> (Arc<FakeApi>, String) {
    let api = Arc::new(FakeApi::default());
    let app = Router::new()
        .route("/api/customer/login/", post(customer_login))
        .route("/api/customer/profile/", get(customer_profile))
        .route("/api/customer/transactions/", get(customer_transactions))
        .route("/api/customer/logout/", post(customer_logout))
        .route("/api/admin/login/", post(admin_login))
        .route("/api/admin/support-tickets/", get(admin_tickets))
        .route("/api/token/refresh/", post(token_refresh))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (api, format!("http://{addr}/api"))
}

// =============================================================================
// Harness
// =============================================================================

struct Fixture {
    api: Arc<FakeApi>,
    tokens: TokenStore,
    bus: InvalidationBus,
    backend: Arc<HttpAuthBackend>,
    invalidations: Arc<Mutex<Vec<Scope>>>,
    _sub: Subscription,
}

async fn fixture_with(refresh_endpoint: Option<&str>) -> Fixture {
    let (api, base_url) = spawn_api().await;
    let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
    let bus = InvalidationBus::new();
    let config = ClientConfig {
        refresh_endpoint: refresh_endpoint.map(str::to_string),
        ..ClientConfig::default().with_base_url(base_url)
    };
    let backend =
        Arc::new(HttpAuthBackend::from_config(&config, tokens.clone(), bus.clone()).unwrap());

    let invalidations = Arc::new(Mutex::new(Vec::new()));
    let sink = invalidations.clone();
    let sub = bus.subscribe(move |event| sink.lock().unwrap().push(event.scope));

    Fixture {
        api,
        tokens,
        bus,
        backend,
        invalidations,
        _sub: sub,
    }
}

async fn fixture() -> Fixture {
    fixture_with(None).await
}

impl Fixture {
    fn invalidations(&self) -> Vec<Scope> {
        self.invalidations.lock().unwrap().clone()
    }
}

// =============================================================================
// Client behaviour
// =============================================================================

#[tokio::test]
async fn stored_token_is_sent_as_bearer() {
    let f = fixture().await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("cust-access", "cust-refresh"))
        .unwrap();

    let user = f.backend.fetch_profile(Scope::Customer).await.unwrap();

    assert_eq!(user.email, "jane@example.com");
    let calls = f.api.requests_to("/api/customer/profile/");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer cust-access"));
}

#[tokio::test]
async fn login_path_never_carries_a_token() {
    let f = fixture().await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("leftover", "leftover"))
        .unwrap();

    f.backend
        .login(Scope::Customer, &Credentials::new("jane@example.com", "secret"))
        .await
        .unwrap();

    let calls = f.api.requests_to("/api/customer/login/");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].authorization.is_none());
    assert_eq!(calls[0].body["email"], "jane@example.com");
}

#[tokio::test]
async fn rejected_token_clears_and_publishes() {
    let f = fixture().await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("expired", "cust-refresh"))
        .unwrap();

    let err = f.backend.fetch_profile(Scope::Customer).await.unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized(m) if m.contains("not valid")));
    assert!(f.tokens.get(Scope::Customer).unwrap().is_none());
    assert_eq!(f.invalidations(), vec![Scope::Customer]);
}

#[tokio::test]
async fn refresh_then_retry_recovers() {
    let f = fixture_with(Some("/token/refresh/")).await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("expired", "cust-refresh"))
        .unwrap();

    let user = f.backend.fetch_profile(Scope::Customer).await.unwrap();

    assert_eq!(user.id, 42);
    assert_eq!(
        f.tokens.get(Scope::Customer).unwrap(),
        Some(TokenPair::new("refreshed-access", "cust-refresh"))
    );
    assert!(f.invalidations().is_empty());
    let profile_calls = f.api.requests_to("/api/customer/profile/");
    assert_eq!(profile_calls.len(), 2);
    assert_eq!(
        profile_calls[1].authorization.as_deref(),
        Some("Bearer refreshed-access")
    );
    let refresh_calls = f.api.requests_to("/api/token/refresh/");
    assert_eq!(refresh_calls.len(), 1);
    assert!(refresh_calls[0].authorization.is_none());
}

#[tokio::test]
async fn failed_refresh_falls_back_to_invalidation() {
    let f = fixture_with(Some("token/refresh/")).await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("expired", "revoked-refresh"))
        .unwrap();

    let err = f.backend.fetch_profile(Scope::Customer).await.unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert_eq!(f.api.requests_to("/api/customer/profile/").len(), 1);
    assert_eq!(f.api.requests_to("/api/token/refresh/").len(), 1);
    assert!(f.tokens.get(Scope::Customer).unwrap().is_none());
    assert_eq!(f.invalidations(), vec![Scope::Customer]);
}

#[tokio::test]
async fn refresh_is_attempted_once_per_request() {
    let f = fixture_with(Some("token/refresh/")).await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("expired", "cust-refresh"))
        .unwrap();

    let err = f
        .backend
        .client(Scope::Customer)
        .get::<Value>("customer/transactions/")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert_eq!(f.api.requests_to("/api/customer/transactions/").len(), 2);
    assert_eq!(f.api.requests_to("/api/token/refresh/").len(), 1);
    assert_eq!(f.invalidations(), vec![Scope::Customer]);
}

// =============================================================================
// Backend behaviour
// =============================================================================

#[tokio::test]
async fn bad_credentials_surface_the_envelope_message() {
    let f = fixture().await;

    let err = f
        .backend
        .login(Scope::Customer, &Credentials::new("jane@example.com", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::AuthenticationFailed(m) if m == "Invalid email or password"));
    assert!(f.invalidations().is_empty());
}

#[tokio::test]
async fn customer_login_returns_tokens_and_user_without_storing() {
    let f = fixture().await;

    let (tokens, user) = f
        .backend
        .login(Scope::Customer, &Credentials::new("jane@example.com", "secret"))
        .await
        .unwrap();

    assert_eq!(tokens, TokenPair::new("cust-access", "cust-refresh"));
    assert_eq!(user.display_name(), "Jane Doe");
    assert!(user.is_kyc_verified);
    assert!(f.tokens.get(Scope::Customer).unwrap().is_none());
}

#[tokio::test]
async fn admin_login_without_user_checks_with_fresh_token() {
    let f = fixture().await;

    let (tokens, user) = f
        .backend
        .login(Scope::Admin, &Credentials::new("root@investpro.test", "secret"))
        .await
        .unwrap();

    assert_eq!(tokens.access, "admin-access");
    assert!(user.is_admin());
    assert_eq!(user.email, "root@investpro.test");
    let checks = f.api.requests_to("/api/admin/support-tickets/");
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].authorization.as_deref(), Some("Bearer admin-access"));
    assert!(f.tokens.get(Scope::Admin).unwrap().is_none());
}

#[tokio::test]
async fn admin_profile_rejection_invalidates_admin_only() {
    let f = fixture().await;
    f.tokens
        .set(Scope::Admin, &TokenPair::new("stale-admin", "r"))
        .unwrap();

    let err = f.backend.fetch_profile(Scope::Admin).await.unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert_eq!(f.invalidations(), vec![Scope::Admin]);
}

#[tokio::test]
async fn customer_logout_posts_refresh_with_captured_access() {
    let f = fixture().await;

    f.backend
        .logout(
            Scope::Customer,
            &TokenPair::new("cust-access", "cust-refresh"),
        )
        .await
        .unwrap();

    let calls = f.api.requests_to("/api/customer/logout/");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer cust-access"));
    assert_eq!(calls[0].body["refresh"], "cust-refresh");
}

#[tokio::test]
async fn admin_server_logout_is_opt_in() {
    let f = fixture().await;
    assert!(f.backend.supports_server_logout(Scope::Customer));
    assert!(!f.backend.supports_server_logout(Scope::Admin));
}

#[tokio::test]
async fn unreachable_api_is_a_network_error() {
    let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
    let config = ClientConfig::default().with_base_url("http://127.0.0.1:9/api");
    let backend = HttpAuthBackend::from_config(&config, tokens, InvalidationBus::new()).unwrap();

    let err = backend
        .login(Scope::Customer, &Credentials::new("jane@example.com", "secret"))
        .await
        .unwrap_err();

    assert!(err.is_network());
}

// =============================================================================
// Orchestrator over HTTP
// =============================================================================

#[tokio::test]
async fn rejected_request_logs_the_session_out() {
    let f = fixture().await;
    let orchestrator = SessionOrchestrator::new(
        f.tokens.clone(),
        f.backend.clone(),
        f.bus.clone(),
        SessionConfig::default(),
    );
    orchestrator.boot().await;
    orchestrator
        .login_customer("jane@example.com", "secret")
        .await
        .unwrap();
    assert!(orchestrator.session().is_authenticated());

    let _ = f
        .backend
        .client(Scope::Customer)
        .get::<Value>("customer/transactions/")
        .await;

    assert_eq!(orchestrator.session().phase, Phase::Unauthenticated);
    assert!(f.tokens.get(Scope::Customer).unwrap().is_none());
}

#[tokio::test]
async fn stored_customer_session_restores_over_http() {
    let f = fixture().await;
    f.tokens
        .set(Scope::Customer, &TokenPair::new("cust-access", "cust-refresh"))
        .unwrap();
    let orchestrator = SessionOrchestrator::new(
        f.tokens.clone(),
        f.backend.clone(),
        f.bus.clone(),
        SessionConfig::default(),
    );

    let session = orchestrator.boot().await;

    assert_eq!(session.phase, Phase::Authenticated);
    assert_eq!(session.user.map(|u| u.id), Some(42));
}
