//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use trusted_proxy::config::RegistryConfig;

/// `admin` with an empty password
pub const REGISTRY_AUTH: &str = "Basic YWRtaW46";

/// Registry contents served by [`spawn_registry`]
#[derive(Default)]
pub struct RegistryFixture {
    pub groups: Vec<(String, Vec<String>)>,
    pub tokens: HashMap<String, String>,
    pub fail_groups: bool,
    pub failing_device_groups: HashSet<String>,
    pub token_calls: AtomicUsize,
}

impl RegistryFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, name: &str, addresses: &[&str]) -> Self {
        self.groups.push((
            name.to_string(),
            addresses.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    pub fn token(mut self, address: &str, token: &str) -> Self {
        self.tokens.insert(address.to_string(), token.to_string());
        self
    }

    pub fn failing_groups(mut self) -> Self {
        self.fail_groups = true;
        self
    }

    pub fn failing_devices(mut self, group: &str) -> Self {
        self.failing_device_groups.insert(group.to_string());
        self
    }

    /// The example registry: one trust group, one ordinary group
    pub fn example() -> Self {
        Self::new()
            .group("TrustProxy-A", &["10.1.1.1"])
            .group("Other", &["10.1.1.2"])
            .token("10.1.1.1", "token-10.1.1.1")
            .token("10.1.1.2", "token-10.1.1.2")
    }
}

/// A fake registry listening on an ephemeral local port
pub struct RunningRegistry {
    pub fixture: Arc<RegistryFixture>,
    pub port: u16,
}

impl RunningRegistry {
    pub fn config(&self) -> RegistryConfig {
        RegistryConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            ..RegistryConfig::default()
        }
    }

    pub fn token_calls(&self) -> usize {
        self.fixture.token_calls.load(Ordering::SeqCst)
    }
}

#[derive(Deserialize)]
struct TokenRequest {
    address: String,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .is_some_and(|v| v == REGISTRY_AUTH)
}

async fn list_groups(State(fx): State<Arc<RegistryFixture>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if fx.fail_groups {
        return (StatusCode::INTERNAL_SERVER_ERROR, "resolver unavailable").into_response();
    }
    let items: Vec<_> = fx
        .groups
        .iter()
        .map(|(name, _)| serde_json::json!({ "groupName": name, "kind": "group" }))
        .collect();
    Json(serde_json::json!({ "items": items })).into_response()
}

async fn list_devices(
    State(fx): State<Arc<RegistryFixture>>,
    Path(group): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if fx.failing_device_groups.contains(&group) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "listing failed").into_response();
    }
    let Some((_, addresses)) = fx.groups.iter().find(|(name, _)| *name == group) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let items: Vec<_> = addresses
        .iter()
        .map(|a| serde_json::json!({ "address": a, "state": "ACTIVE" }))
        .collect();
    Json(serde_json::json!({ "items": items })).into_response()
}

async fn issue_token(
    State(fx): State<Arc<RegistryFixture>>,
    headers: HeaderMap,
    Json(request): Json<TokenRequest>,
) -> Response {
    fx.token_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match fx.tokens.get(&request.address) {
        Some(token) => token.clone().into_response(),
        None => (StatusCode::BAD_REQUEST, "unknown device").into_response(),
    }
}

/// Serve `fixture` as a registry on an ephemeral port
pub async fn spawn_registry(fixture: RegistryFixture) -> RunningRegistry {
    let fixture = Arc::new(fixture);
    let app = Router::new()
        .route("/mgmt/shared/resolver/device-groups", get(list_groups))
        .route(
            "/mgmt/shared/resolver/device-groups/{group}/devices",
            get(list_devices),
        )
        .route("/shared/token", post(issue_token))
        .with_state(Arc::clone(&fixture));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fake registry");
    let port = listener.local_addr().expect("no local addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake registry failed");
    });

    RunningRegistry { fixture, port }
}
