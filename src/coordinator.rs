//! Per-request coordination
//!
//! Every inbound request moves through
//! `Received -> Routing(mode) -> Aggregating(mode) -> Completed` and produces
//! exactly one [`Completion`]. Token enumeration is fail-open: missing tokens
//! degrade the result. Proxy dispatch is fail-closed: its failure is the result.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::Error;
use crate::proxy::{ProxyDispatcher, ProxyRequest, ProxyRequestBody, ProxyResponse};
use crate::resolver::{TrustedDeviceResolver, dedup_by_address};
use crate::token::{Token, TokenIssuer};

/// An inbound request as delivered by the HTTP surface
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Full inbound URI, used as the referer of proxied requests
    pub uri: String,
    /// Device address asked for, if any
    pub target_host: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Request with no headers or body
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            target_host: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set the target host from a path segment or a `targetHost` query value
    ///
    /// The path segment wins; empty values count as absent.
    #[must_use]
    pub fn with_target(mut self, path_segment: Option<String>, query: Option<String>) -> Self {
        self.target_host = path_segment
            .filter(|s| !s.is_empty())
            .or_else(|| query.filter(|s| !s.is_empty()));
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

/// The single terminal result of an inbound request
#[derive(Debug)]
pub enum Completion {
    /// Raw token body for one targeted device, empty when none was issued
    Token(Option<Token>),
    /// Token (or `None`) for every trusted device address
    Tokens(BTreeMap<String, Option<Token>>),
    /// A device's response to a proxied request
    Proxied(ProxyResponse),
    /// Failure carrying its HTTP status
    Failed(Error),
}

impl Completion {
    /// HTTP status this completion is delivered with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Token(_) | Self::Tokens(_) => StatusCode::OK,
            Self::Proxied(response) => response.status,
            Self::Failed(e) => e.status_code(),
        }
    }
}

/// Accepts the terminal result of one request
///
/// Completing consumes the completer, so a request cannot be completed twice.
pub trait Completer {
    fn complete(self, completion: Completion);
}

impl Completer for oneshot::Sender<Completion> {
    fn complete(self, completion: Completion) {
        if self.send(completion).is_err() {
            tracing::debug!("requester went away before completion");
        }
    }
}

/// How a request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Tokens for every trusted device
    Enumerate,
    /// Token for one named device
    Targeted,
    /// Forward to a device of a named group
    Proxy,
}

/// Lifecycle position of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Routing(Mode),
    Aggregating(Mode),
    Completed,
}

/// Tracks one request through its states
#[derive(Debug)]
struct Lifecycle {
    id: Uuid,
    state: RequestState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        let allowed = matches!(
            (self.state, next),
            (RequestState::Received, RequestState::Routing(_) | RequestState::Completed)
                | (RequestState::Routing(_), RequestState::Aggregating(_) | RequestState::Completed)
                | (RequestState::Aggregating(_), RequestState::Completed)
        );
        debug_assert!(allowed, "illegal transition {:?} -> {next:?}", self.state);
        tracing::debug!(request_id = %self.id, from = ?self.state, to = ?next, "request state");
        self.state = next;
    }

    fn complete(mut self, completion: Completion) -> Completion {
        self.advance(RequestState::Completed);
        tracing::info!(
            request_id = %self.id,
            status = completion.status().as_u16(),
            "request completed"
        );
        completion
    }
}

/// Serves inbound requests against the registry and the routing channel
#[derive(Clone)]
pub struct RequestCoordinator {
    resolver: TrustedDeviceResolver,
    issuer: TokenIssuer,
    dispatcher: ProxyDispatcher,
}

impl RequestCoordinator {
    #[must_use]
    pub const fn new(
        resolver: TrustedDeviceResolver,
        issuer: TokenIssuer,
        dispatcher: ProxyDispatcher,
    ) -> Self {
        Self {
            resolver,
            issuer,
            dispatcher,
        }
    }

    /// Serve a request and hand its completion to `completer`
    pub async fn serve<C: Completer>(&self, request: InboundRequest, completer: C) {
        let completion = self.handle(request).await;
        completer.complete(completion);
    }

    /// Serve a request, returning its single completion
    pub async fn handle(&self, request: InboundRequest) -> Completion {
        let mut lifecycle = Lifecycle::new();
        tracing::debug!(
            request_id = %lifecycle.id,
            method = %request.method,
            uri = %request.uri,
            "request received"
        );

        let mode = if request.method == Method::POST {
            Mode::Proxy
        } else if request.method == Method::GET {
            if request.target_host.is_some() {
                Mode::Targeted
            } else {
                Mode::Enumerate
            }
        } else {
            return lifecycle.complete(Completion::Failed(Error::MethodNotAllowed(
                request.method.to_string(),
            )));
        };
        lifecycle.advance(RequestState::Routing(mode));

        let completion = match (mode, request.target_host) {
            (Mode::Targeted, Some(target)) => self.targeted(&mut lifecycle, &target).await,
            (Mode::Proxy, _) => {
                self.proxy(&mut lifecycle, request.uri, &request.headers, &request.body)
                    .await
            }
            _ => self.enumerate(&mut lifecycle).await,
        };

        lifecycle.complete(completion)
    }

    async fn enumerate(&self, lifecycle: &mut Lifecycle) -> Completion {
        let devices = dedup_by_address(self.resolver.resolve().await);
        lifecycle.advance(RequestState::Aggregating(Mode::Enumerate));

        let tokens = self
            .issuer
            .issue_all(devices.iter().map(|d| d.address.as_str()))
            .await;
        Completion::Tokens(tokens)
    }

    async fn targeted(&self, lifecycle: &mut Lifecycle, target: &str) -> Completion {
        let devices = self.resolver.resolve().await;
        let matches = devices.iter().filter(|d| d.address == target).count();

        if matches == 0 {
            tracing::warn!(target_host = %target, "target host is not a trusted device");
            return Completion::Failed(Error::UnresolvedTarget(target.to_string()));
        }
        if matches > 1 {
            tracing::warn!(
                target_host = %target,
                listings = matches,
                "target host is listed in several trust groups, issuing one token"
            );
        }

        lifecycle.advance(RequestState::Aggregating(Mode::Targeted));
        Completion::Token(self.issuer.get_token(target).await)
    }

    async fn proxy(
        &self,
        lifecycle: &mut Lifecycle,
        referer: String,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Completion {
        let request = match parse_proxy_body(body)
            .and_then(|parsed| ProxyRequest::from_body(parsed, headers, referer))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejected proxy request");
                return Completion::Failed(e);
            }
        };

        lifecycle.advance(RequestState::Aggregating(Mode::Proxy));
        match self.dispatcher.dispatch(request).await {
            Ok(response) => Completion::Proxied(response),
            Err(e) => Completion::Failed(e),
        }
    }
}

fn parse_proxy_body(body: &Bytes) -> crate::Result<ProxyRequestBody> {
    if body.is_empty() {
        return Err(Error::BadRequest("request body is required".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| Error::BadRequest(format!("invalid request body: {e}")))
}
