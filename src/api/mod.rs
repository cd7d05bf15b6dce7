//! HTTP API server for the trusted proxy
//!
//! Mounts the worker path (token lookups on GET, proxy dispatch on POST) and
//! the health endpoint. Each handler is the completer of its own request.

pub mod health;

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::coordinator::{Completion, InboundRequest, RequestCoordinator};
use crate::token::Token;
use crate::{Error, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: RequestCoordinator,
}

/// `targetHost` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    #[serde(rename = "targetHost")]
    pub target_host: Option<String>,
}

/// Error body for failed requests
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Target host taken from the first path segment after the worker path
#[derive(Debug, Deserialize)]
struct TargetPath {
    target_host: String,
}

/// Build the worker router mounted at `worker_path`
///
/// Only the first segment after the worker path names a target; any further
/// segments are ignored. A trailing slash with no segment enumerates.
#[must_use]
pub fn router(state: Arc<ApiState>, worker_path: &str) -> Router {
    let slash_path = format!("{worker_path}/");
    let target_path = format!("{worker_path}/{{target_host}}");
    let nested_path = format!("{worker_path}/{{target_host}}/{{*rest}}");

    Router::new()
        .route(worker_path, get(get_tokens).post(post_proxy))
        .route(&slash_path, get(get_tokens))
        .route(&target_path, get(get_target_token))
        .route(&nested_path, get(get_target_token))
        .with_state(state)
}

/// Build the full application: worker routes, health, request tracing
#[must_use]
pub fn app(state: Arc<ApiState>, worker_path: &str) -> Router {
    router(state, worker_path)
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
}

/// Serve the application until `shutdown` resolves
///
/// # Errors
///
/// Returns error if the listener cannot be bound or the server fails
pub async fn serve(
    app: Router,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "trusted proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// GET tokens for every trusted device, or for `?targetHost=`
async fn get_tokens(
    State(state): State<Arc<ApiState>>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<TargetQuery>,
) -> Response {
    let request =
        InboundRequest::new(Method::GET, uri.to_string()).with_target(None, query.target_host);
    complete(&state, request).await
}

/// GET the token for the device named in the path
async fn get_target_token(
    State(state): State<Arc<ApiState>>,
    OriginalUri(uri): OriginalUri,
    Path(TargetPath { target_host }): Path<TargetPath>,
    Query(query): Query<TargetQuery>,
) -> Response {
    let request = InboundRequest::new(Method::GET, uri.to_string())
        .with_target(Some(target_host), query.target_host);
    complete(&state, request).await
}

/// POST a request to proxy to a device of a trust group
async fn post_proxy(
    State(state): State<Arc<ApiState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest::new(Method::POST, uri.to_string())
        .with_headers(headers)
        .with_body(body);
    complete(&state, request).await
}

async fn complete(state: &ApiState, request: InboundRequest) -> Response {
    let (tx, rx) = oneshot::channel();
    state.coordinator.serve(request, tx).await;

    rx.await
        .unwrap_or(Completion::Failed(Error::Incomplete))
        .into_response()
}

impl IntoResponse for Completion {
    fn into_response(self) -> Response {
        match self {
            Self::Token(token) => {
                let body = token.map(Token::into_inner).unwrap_or_default();
                (StatusCode::OK, body).into_response()
            }
            Self::Tokens(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
            Self::Proxied(proxied) => {
                let mut response = Response::new(Body::from(proxied.body));
                *response.status_mut() = proxied.status;
                *response.headers_mut() = proxied.headers;
                response
            }
            Self::Failed(e) => e.into_response(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::http::HeaderValue;

    use super::*;
    use crate::proxy::ProxyResponse;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn token_completion_is_raw_body() {
        let response = Completion::Token(Some(Token::new("tok-1".to_string()))).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "tok-1");
    }

    #[tokio::test]
    async fn missing_token_is_empty_ok() {
        let response = Completion::Token(None).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn incomplete_request_is_internal_error() {
        let response = Completion::Failed(Error::Incomplete).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["code"], 500);
    }

    #[tokio::test]
    async fn token_map_uses_null_for_missing() {
        let tokens = BTreeMap::from([
            ("10.1.1.1".to_string(), Some(Token::new("tok-1".to_string()))),
            ("10.1.1.3".to_string(), None),
        ]);
        let response = Completion::Tokens(tokens).into_response();

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json, serde_json::json!({"10.1.1.1": "tok-1", "10.1.1.3": null}));
    }

    #[tokio::test]
    async fn proxied_completion_is_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert("x-device", HeaderValue::from_static("bigip-1"));
        let response = Completion::Proxied(ProxyResponse {
            status: StatusCode::IM_A_TEAPOT,
            headers,
            body: Bytes::from_static(b"short and stout"),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers().get("x-device").unwrap(), "bigip-1");
        assert_eq!(body_string(response).await, "short and stout");
    }

    #[tokio::test]
    async fn failure_has_code_and_message() {
        let response =
            Completion::Failed(Error::UnresolvedTarget("10.1.1.2".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["code"], 404);
        assert!(json["message"].as_str().unwrap().contains("10.1.1.2"));
    }
}
