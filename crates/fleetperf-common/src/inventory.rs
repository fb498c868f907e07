//! Serde mirrors of the three device inventories.
//!
//! The test controller exposes three independently keyed views of the
//! same fleet: the port list (keyed by `shelf.resource.ifname`), the ADB
//! registration list (keyed by agent serial), and the resource list
//! (keyed by `shelf.resource`). The registry merges them into one
//! canonical roster; these types only carry the fields that merge needs.

use serde::{Deserialize, Serialize};

/// One entry of the port inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortEntry {
    /// Full port identifier, e.g. `1.11.wlan0`.
    pub id: String,
    /// Ghost entry — the port is gone but still listed.
    #[serde(default)]
    pub phantom: bool,
    /// Administratively down.
    #[serde(default)]
    pub down: bool,
    /// Parent radio device, e.g. `wiphy0`. Ports on other parents belong
    /// to media the platform does not track.
    #[serde(default, rename = "parent_dev")]
    pub parent_dev: String,
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub mac: String,
}

impl PortEntry {
    /// Resource identifier of this port: the first two dot segments of
    /// the port id (`1.11.wlan0` → `1.11`). `None` for malformed ids.
    pub fn resource_id(&self) -> Option<String> {
        let parts: Vec<&str> = self.id.split('.').collect();
        if parts.len() < 3 {
            return None;
        }
        Some(format!("{}.{}", parts[0], parts[1]))
    }
}

/// One entry of the ADB registration inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbEntry {
    /// Qualified name, e.g. `1.1.R9ZW9098RMZ` — last segment is the serial.
    pub name: String,
    /// Resource this registration is linked to, e.g. `1.11`. Missing
    /// linkage means the entry cannot be merged.
    #[serde(default, rename = "resource_id")]
    pub resource_id: String,
    /// Friendly device name configured by the operator.
    #[serde(default, rename = "user_name")]
    pub user_name: String,
    #[serde(default, rename = "wifi_mac")]
    pub wifi_mac: String,
}

impl AdbEntry {
    /// Stable serial-derived key: the last dot segment of the name.
    pub fn serial(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// One entry of the resource inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Resource identifier, e.g. `1.11`.
    pub id: String,
    /// Management-network IP of the device.
    #[serde(default, rename = "ctrl_ip")]
    pub ctrl_ip: String,
    #[serde(default)]
    pub hostname: String,
    /// Free-text device-type label, e.g. `Android`, `Linux/Interop`.
    #[serde(default, rename = "device_type")]
    pub device_type: String,
}
