//! Trust token issuance
//!
//! A trust token is an opaque credential the registry issues for one device
//! address. The registry keeps it valid for about ten minutes; nothing here
//! tracks or enforces that window, and tokens are never cached. Callers that
//! hold on to a token past that window should expect the device to reject it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::registry::Registry;

/// Opaque trust token body as issued by the registry
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    #[must_use]
    pub const fn new(body: String) -> Self {
        Self(body)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

// Token bodies are credentials and stay out of logs
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&"[REDACTED]").finish()
    }
}

/// Requests trust tokens from the registry
#[derive(Clone)]
pub struct TokenIssuer {
    registry: Arc<dyn Registry>,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Request a token for one address; any failure is logged and yields `None`
    pub async fn get_token(&self, address: &str) -> Option<Token> {
        match self.registry.issue_token(address).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(address = %address, error = %e, "error issuing trust token");
                None
            }
        }
    }

    /// Request tokens for every address concurrently
    ///
    /// Every address appears as a key; failed issuance maps to `None` without
    /// affecting the others.
    pub async fn issue_all<'a, I>(&self, addresses: I) -> BTreeMap<String, Option<Token>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let addresses: Vec<&str> = addresses.into_iter().collect();
        let tokens = join_all(addresses.iter().map(|address| self.get_token(address))).await;

        addresses
            .into_iter()
            .map(str::to_string)
            .zip(tokens)
            .collect()
    }
}
