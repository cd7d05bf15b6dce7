//! Routing channel that forwards proxy requests to trusted devices over HTTP

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use reqwest::Client;

use super::{ProxyRequest, ProxyResponse, RouteError, RouteReply, RoutingChannel};
use crate::Result;
use crate::config::RouterConfig;
use crate::registry::Registry;
use crate::token::TokenIssuer;

/// Headers that describe a single connection and are not forwarded
static HOP_BY_HOP: [HeaderName; 5] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Picks a device from the requested group, attaches a fresh trust token,
/// and forwards the request to it
#[derive(Clone)]
pub struct DeviceRouter {
    registry: Arc<dyn Registry>,
    issuer: TokenIssuer,
    client: Client,
    scheme: String,
    token_header: HeaderName,
}

impl DeviceRouter {
    /// Create a router
    ///
    /// # Errors
    ///
    /// Returns error if the token header name is invalid or the HTTP client
    /// cannot be built
    pub fn new(registry: Arc<dyn Registry>, config: &RouterConfig) -> Result<Self> {
        let token_header =
            HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|_| {
                crate::Error::Config(format!("invalid token header name: {}", config.token_header))
            })?;

        // Proxied responses are returned as the device sent them
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            issuer: TokenIssuer::new(Arc::clone(&registry)),
            registry,
            client,
            scheme: config.device_scheme.clone(),
            token_header,
        })
    }

    async fn forward(
        &self,
        request: ProxyRequest,
    ) -> std::result::Result<ProxyResponse, RouteError> {
        let devices = self
            .registry
            .list_devices(&request.group_name)
            .await
            .map_err(|e| {
                RouteError::new(
                    Some(502),
                    format!("device group {} unavailable: {e}", request.group_name),
                )
            })?;

        let Some(device) = devices.into_iter().next() else {
            return Err(RouteError::new(
                Some(404),
                format!("no trusted device in group {}", request.group_name),
            ));
        };

        let token = self.issuer.get_token(&device.address).await.ok_or_else(|| {
            RouteError::new(
                Some(502),
                format!("no trust token issued for {}", device.address),
            )
        })?;
        let token = HeaderValue::from_str(token.as_str()).map_err(|_| {
            RouteError::new(
                Some(502),
                format!(
                    "trust token for {} is not a valid header value",
                    device.address
                ),
            )
        })?;

        let url = format!("{}://{}{}", self.scheme, device.address, request.uri);
        tracing::debug!(
            group = %request.group_name,
            device = %device.address,
            method = %request.method,
            uri = %request.uri,
            "forwarding proxy request"
        );

        let mut headers = strip_hop_by_hop(request.headers);
        headers.insert(self.token_header.clone(), token);
        if let Ok(referer) = HeaderValue::from_str(&request.referer) {
            headers.insert(header::REFERER, referer);
        }

        let mut req = self.client.request(request.method, &url).headers(headers);
        req = match request.body {
            None => req,
            Some(serde_json::Value::String(text)) => req.body(text),
            Some(value) => req.json(&value),
        };

        let response = req.send().await.map_err(|e| {
            RouteError::new(
                Some(502),
                format!("request to {} failed: {e}", device.address),
            )
        })?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers().clone());
        let body = response.bytes().await.map_err(|e| {
            RouteError::new(
                Some(502),
                format!("reading response from {} failed: {e}", device.address),
            )
        })?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

impl RoutingChannel for DeviceRouter {
    fn submit(&self, request: ProxyRequest, reply: RouteReply) {
        let router = self.clone();
        tokio::spawn(async move {
            match router.forward(request).await {
                Ok(response) => reply.succeed(response),
                Err(error) => reply.fail(error),
            }
        });
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers
}
