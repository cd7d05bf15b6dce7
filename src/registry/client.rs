//! HTTP client for the local device registry

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::Registry;
use super::types::{Device, DeviceEntry, DeviceGroup, ItemList};
use crate::config::RegistryConfig;
use crate::token::Token;
use crate::{Error, Result};

/// Device group listing endpoint
pub const DEVICE_GROUPS_PATH: &str = "/mgmt/shared/resolver/device-groups";

/// Trust token issuance endpoint
pub const TOKEN_PATH: &str = "/shared/token";

/// Device listing endpoint for one group
#[must_use]
pub fn devices_path(group_name: &str) -> String {
    format!(
        "{DEVICE_GROUPS_PATH}/{}/devices",
        urlencoding::encode(group_name)
    )
}

/// Client for the registry, authenticated with a fixed basic credential
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    username: String,
    password: SecretString,
}

impl RegistryClient {
    /// Create a client from registry configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    /// Send a request, turning a status of 400 or above into `Error::UpstreamStatus`
    async fn send(&self, req: RequestBuilder, path: &str) -> Result<Response> {
        let response = self.authorized(req).send().await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        Ok(response)
    }

    async fn get_items<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}{path}", self.base_url);
        let response = self.send(self.client.get(&url), path).await?;
        let list: ItemList<T> = response.json().await?;
        Ok(list.items)
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn list_device_groups(&self) -> Result<Vec<DeviceGroup>> {
        self.get_items(DEVICE_GROUPS_PATH).await
    }

    async fn list_devices(&self, group_name: &str) -> Result<Vec<Device>> {
        let entries: Vec<DeviceEntry> = self.get_items(&devices_path(group_name)).await?;

        Ok(entries
            .into_iter()
            .map(|entry| Device {
                address: entry.address,
                group_name: group_name.to_string(),
            })
            .collect())
    }

    async fn issue_token(&self, address: &str) -> Result<Token> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);
        let req = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "address": address }));

        let response = self.send(req, TOKEN_PATH).await?;
        Ok(Token::new(response.text().await?))
    }
}
