//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::registry::{Device, DeviceGroup, Registry};
use crate::token::Token;
use crate::{Error, Result};

/// Registry backed by fixed groups, devices and tokens
#[derive(Default)]
pub struct FakeRegistry {
    groups: Vec<(String, Vec<String>)>,
    tokens: HashMap<String, String>,
    fail_groups: bool,
    failing_device_groups: HashSet<String>,
    token_calls: AtomicUsize,
    token_requests: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: &str, addresses: &[&str]) -> Self {
        self.groups.push((
            name.to_string(),
            addresses.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    pub fn with_token(mut self, address: &str, token: &str) -> Self {
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

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> Vec<String> {
        self.token_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn list_device_groups(&self) -> Result<Vec<DeviceGroup>> {
        if self.fail_groups {
            return Err(Error::UpstreamStatus {
                status: 500,
                path: crate::registry::DEVICE_GROUPS_PATH.to_string(),
            });
        }
        Ok(self
            .groups
            .iter()
            .map(|(name, _)| DeviceGroup { name: name.clone() })
            .collect())
    }

    async fn list_devices(&self, group_name: &str) -> Result<Vec<Device>> {
        if self.failing_device_groups.contains(group_name) {
            return Err(Error::UpstreamStatus {
                status: 404,
                path: crate::registry::devices_path(group_name),
            });
        }
        Ok(self
            .groups
            .iter()
            .filter(|(name, _)| name == group_name)
            .flat_map(|(_, addresses)| addresses.iter())
            .map(|address| Device {
                address: address.clone(),
                group_name: group_name.to_string(),
            })
            .collect())
    }

    async fn issue_token(&self, address: &str) -> Result<Token> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token_requests.lock().unwrap().push(address.to_string());
        self.tokens
            .get(address)
            .map(|t| Token::new(t.clone()))
            .ok_or_else(|| Error::UpstreamStatus {
                status: 400,
                path: crate::registry::TOKEN_PATH.to_string(),
            })
    }
}
