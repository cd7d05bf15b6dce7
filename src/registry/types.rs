//! Registry data model

use serde::{Deserialize, Serialize};

/// A device group as listed by the registry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceGroup {
    #[serde(rename = "groupName")]
    pub name: String,
}

impl DeviceGroup {
    /// Whether this group's name marks it as a trust group
    #[must_use]
    pub fn is_trust_group(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }
}

/// A device listed under a device group
///
/// Devices are produced fresh on every discovery and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Network address the registry knows the device by
    pub address: String,
    /// Group the device was listed under
    pub group_name: String,
}

/// Device entry as the registry returns it, before the group is attached
#[derive(Debug, Deserialize)]
pub(crate) struct DeviceEntry {
    pub address: String,
}

/// `{ "items": [...] }` envelope used by the registry listing endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
