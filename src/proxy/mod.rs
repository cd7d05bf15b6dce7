//! Proxy dispatch to trusted devices
//!
//! A [`ProxyRequest`] names a device group rather than a device. It is handed
//! to a [`RoutingChannel`], which picks the device, performs the call, and
//! answers the accompanying [`RouteReply`] exactly once. Dispatch failures are
//! always surfaced to the caller.

mod router;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde::Deserialize;
use tokio::sync::oneshot;

pub use router::DeviceRouter;

use crate::{Error, Result};

/// Status reported when a routing failure carries none of its own
pub const DEFAULT_FAILURE_STATUS: u16 = 500;

/// Body of an inbound proxy request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequestBody {
    pub group_name: Option<String>,
    pub method: Option<String>,
    pub uri: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<serde_json::Value>,
}

/// A request to forward to some device of a named group
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Group the receiving device is chosen from
    pub group_name: String,
    pub method: Method,
    /// Path and query on the device
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// URI of the inbound request that asked for this proxy call
    pub referer: String,
}

impl ProxyRequest {
    /// Build a proxy request from an inbound POST body
    ///
    /// `method` defaults to `GET` and `headers` to the inbound request's own.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if `groupName` or `uri` is missing, or a
    /// method, URI or header does not parse
    pub fn from_body(
        body: ProxyRequestBody,
        inbound_headers: &HeaderMap,
        referer: impl Into<String>,
    ) -> Result<Self> {
        let group_name = body
            .group_name
            .filter(|g| !g.is_empty())
            .ok_or_else(|| Error::BadRequest("groupName is required".to_string()))?;

        let raw_uri = body
            .uri
            .ok_or_else(|| Error::BadRequest("uri is required".to_string()))?;
        let uri = raw_uri
            .parse::<Uri>()
            .ok()
            .and_then(|u| u.path_and_query().map(ToString::to_string))
            .filter(|pq| pq.starts_with('/'))
            .ok_or_else(|| Error::BadRequest(format!("invalid uri: {raw_uri}")))?;

        let method = match body.method {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::BadRequest(format!("invalid method: {m}")))?,
            None => Method::GET,
        };

        let headers = match body.headers {
            Some(map) => header_map(&map)?,
            None => inbound_headers.clone(),
        };

        Ok(Self {
            group_name,
            method,
            uri,
            headers,
            body: body.body,
            referer: referer.into(),
        })
    }
}

fn header_map(map: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(map.len());
    for (name, value) in map {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::BadRequest(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::BadRequest(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// A device's answer to a proxied request
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A routing failure, optionally carrying the HTTP status to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RouteError {
    #[must_use]
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Single-use reply handle for one routed request
///
/// Answering consumes the handle, so a request is answered at most once.
/// Dropping it unanswered fails the dispatch.
#[derive(Debug)]
pub struct RouteReply {
    tx: oneshot::Sender<std::result::Result<ProxyResponse, RouteError>>,
}

impl RouteReply {
    fn channel() -> (
        Self,
        oneshot::Receiver<std::result::Result<ProxyResponse, RouteError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Answer with the device's response
    pub fn succeed(self, response: ProxyResponse) {
        if self.tx.send(Ok(response)).is_err() {
            tracing::debug!("proxy caller went away before the response arrived");
        }
    }

    /// Answer with a failure
    pub fn fail(self, error: RouteError) {
        if self.tx.send(Err(error)).is_err() {
            tracing::debug!("proxy caller went away before the failure arrived");
        }
    }
}

/// Resolves a group to a device, performs the call, and answers the reply
pub trait RoutingChannel: Send + Sync {
    fn submit(&self, request: ProxyRequest, reply: RouteReply);
}

/// Submits proxy requests to a routing channel and awaits their single outcome
#[derive(Clone)]
pub struct ProxyDispatcher {
    channel: Arc<dyn RoutingChannel>,
}

impl ProxyDispatcher {
    #[must_use]
    pub fn new(channel: Arc<dyn RoutingChannel>) -> Self {
        Self { channel }
    }

    /// Dispatch a request and wait for the routing channel's answer
    ///
    /// # Errors
    ///
    /// Returns `Error::ProxyDispatch` with the failure's status (or
    /// [`DEFAULT_FAILURE_STATUS`]) if routing fails or the reply is dropped
    pub async fn dispatch(&self, request: ProxyRequest) -> Result<ProxyResponse> {
        let uri = request.uri.clone();
        let group = request.group_name.clone();
        let (reply, rx) = RouteReply::channel();

        tracing::debug!(
            group = %group,
            method = %request.method,
            uri = %uri,
            "dispatching proxy request"
        );
        self.channel.submit(request, reply);

        let outcome = rx
            .await
            .unwrap_or_else(|_| Err(RouteError::new(None, "routing channel dropped the request")));

        outcome.map_err(|e| {
            tracing::error!(
                uri = %uri,
                group = %group,
                error = %e.message,
                "request to {uri} failed"
            );
            Error::ProxyDispatch {
                status: e.status.unwrap_or(DEFAULT_FAILURE_STATUS),
                message: e.message,
            }
        })
    }
}
