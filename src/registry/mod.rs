//! Local device registry access
//!
//! The registry lists device groups and their devices, and issues trust tokens
//! for device addresses. It is consumed over HTTP, never reimplemented here.

mod client;
pub mod types;

use async_trait::async_trait;

pub use client::{DEVICE_GROUPS_PATH, RegistryClient, TOKEN_PATH, devices_path};
pub use types::{Device, DeviceGroup};

use crate::Result;
use crate::token::Token;

/// Operations the proxy needs from the device registry
///
/// Every call is attempted exactly once. Errors are returned so the caller can
/// log them; callers on discovery paths degrade them to empty results.
#[async_trait]
pub trait Registry: Send + Sync {
    /// List every device group
    async fn list_device_groups(&self) -> Result<Vec<DeviceGroup>>;

    /// List the devices of one group, each stamped with `group_name`
    async fn list_devices(&self, group_name: &str) -> Result<Vec<Device>>;

    /// Request a trust token for a device address
    async fn issue_token(&self, address: &str) -> Result<Token>;
}
