//! Trusted device resolution
//!
//! Lists device groups, keeps the trust groups, and lists the devices of every
//! trust group concurrently. Discovery is fail-open: a failed listing
//! contributes no devices and is logged, never surfaced.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::registry::{Device, Registry};

/// Resolves the current set of trusted devices from the registry
#[derive(Clone)]
pub struct TrustedDeviceResolver {
    registry: Arc<dyn Registry>,
    prefix: String,
}

impl TrustedDeviceResolver {
    /// Create a resolver treating groups named `prefix*` as trust groups
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, prefix: impl Into<String>) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
        }
    }

    /// Resolve every device listed under a trust group
    ///
    /// Never fails. Order within a group is preserved; order across groups is
    /// the order the trust groups were listed in. Duplicate addresses are kept.
    pub async fn resolve(&self) -> Vec<Device> {
        let groups = match self.registry.list_device_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!(error = %e, "no device groups found");
                return Vec::new();
            }
        };

        let trust_groups: Vec<String> = groups
            .into_iter()
            .filter(|g| g.is_trust_group(&self.prefix))
            .map(|g| g.name)
            .collect();

        if trust_groups.is_empty() {
            tracing::debug!(prefix = %self.prefix, "no trust groups registered");
            return Vec::new();
        }

        let listings = join_all(
            trust_groups
                .iter()
                .map(|name| self.registry.list_devices(name)),
        )
        .await;

        let mut devices = Vec::new();
        for (group, listing) in trust_groups.iter().zip(listings) {
            match listing {
                Ok(mut group_devices) => devices.append(&mut group_devices),
                Err(e) => {
                    tracing::error!(group = %group, error = %e, "error getting trusted devices");
                }
            }
        }

        tracing::debug!(
            groups = trust_groups.len(),
            devices = devices.len(),
            "resolved trusted devices"
        );
        devices
    }
}

/// Keep the first device listed for each address, preserving order
#[must_use]
pub fn dedup_by_address(devices: Vec<Device>) -> Vec<Device> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|d| seen.insert(d.address.clone()))
        .collect()
}
