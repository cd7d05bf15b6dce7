//! Trusted Proxy - token broker and request proxy for trusted devices
//!
//! Devices registered under trust groups on the local device registry are
//! discovered per request. Callers can fetch trust tokens for them, or have a
//! request forwarded to a device of a named group without knowing its address
//! or token.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 HTTP surface (api)                   │
//! │   GET tokens  │  GET token/{host}  │  POST proxy     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │             Request coordinator                      │
//! │   Resolver  │  Token issuer  │  Proxy dispatcher     │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │  Device registry    │       │  Routing channel       │
//! │  groups, devices,   │       │  group → device,       │
//! │  tokens             │       │  forward over HTTP     │
//! └─────────────────────┘       └───────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod token;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use config::Config;
pub use coordinator::{Completer, Completion, InboundRequest, RequestCoordinator};
pub use error::{Error, Result};
pub use proxy::{
    DeviceRouter, ProxyDispatcher, ProxyRequest, ProxyResponse, RouteError, RouteReply,
    RoutingChannel,
};
pub use registry::{Device, DeviceGroup, Registry, RegistryClient};
pub use resolver::TrustedDeviceResolver;
pub use token::{Token, TokenIssuer};

/// Wire a coordinator from a registry and a routing channel
#[must_use]
pub fn build_coordinator(
    registry: Arc<dyn Registry>,
    channel: Arc<dyn RoutingChannel>,
    trust_group_prefix: &str,
) -> RequestCoordinator {
    RequestCoordinator::new(
        TrustedDeviceResolver::new(Arc::clone(&registry), trust_group_prefix),
        TokenIssuer::new(registry),
        ProxyDispatcher::new(channel),
    )
}
