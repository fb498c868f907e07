//! The canonical device roster.
//!
//! Three inventories describe the same physical fleet under three
//! different key schemes: ports (`1.11.wlan0`), ADB registrations
//! (agent serial), and resources (`1.11`). A mobile device typically
//! appears in all three. The registry folds them into exactly one
//! `Device` per physical unit:
//!
//! 1. Port entries seed the working map, filtered to tracked device
//!    classes, live ports, and the tracked radio.
//! 2. ADB registrations re-key Android rows by serial (serials are
//!    stable across reconnects; port ids are not) and absorb the
//!    matching wireless port row.
//! 3. Field conflicts resolve first-non-empty-wins, symmetrically.
//! 4. Rows sharing a non-empty IP are the same physical device; the
//!    wireless-interface key wins, ties break lexicographically.
//!
//! Entries that cannot be linked (missing resource id, no ctrl IP) are
//! skipped and logged; only an empty final roster is an error.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::inventory::{AdbEntry, PortEntry, ResourceEntry};
use crate::models::{Device, DeviceClass, DeviceKey};

/// Parent radio whose ports the platform tracks. Ports on other parents
/// (monitors, virtual APs) never enter the roster.
pub const TRACKED_PARENT_DEV: &str = "wiphy0";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no usable devices found in the inventories")]
    EmptyRoster,
}

/// Merge `src` into `dst` field by field: a destination field is
/// overwritten only when it is currently empty and the source field is
/// not. Applied symmetrically whenever two records for the same
/// canonical key combine, regardless of arrival order.
pub fn merge_preferring_non_empty(dst: &mut Device, src: &Device) {
    fn fill(dst: &mut String, src: &str) {
        if dst.is_empty() && !src.is_empty() {
            *dst = src.to_string();
        }
    }
    fill(&mut dst.ip, &src.ip);
    fill(&mut dst.hostname, &src.hostname);
    fill(&mut dst.mac, &src.mac);
    fill(&mut dst.ssid, &src.ssid);
    fill(&mut dst.channel, &src.channel);
    fill(&mut dst.serial, &src.serial);
}

/// The canonical roster for one run. Immutable after `build`.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceKey, Device>,
    by_ip: HashMap<String, DeviceKey>,
}

impl DeviceRegistry {
    /// Merge the three inventories into a canonical roster.
    pub fn build(
        ports: &[PortEntry],
        adb: &[AdbEntry],
        resources: &[ResourceEntry],
    ) -> Result<Self, RegistryError> {
        // Resource view, restricted to tracked device classes.
        let mut tracked: BTreeMap<&str, (&ResourceEntry, DeviceClass)> = BTreeMap::new();
        for res in resources {
            match DeviceClass::from_label(&res.device_type) {
                Some(class) => {
                    tracked.insert(res.id.as_str(), (res, class));
                }
                None => {
                    tracing::debug!(resource = %res.id, device_type = %res.device_type,
                        "untracked device class, skipping resource");
                }
            }
        }

        // ADB registrations by linked resource. Entries without linkage
        // cannot be attributed to a physical device and are dropped.
        let mut adb_by_resource: HashMap<&str, &AdbEntry> = HashMap::new();
        for entry in adb {
            if entry.resource_id.is_empty() {
                tracing::warn!(name = %entry.name, "ADB entry has no resource linkage, dropping");
                continue;
            }
            adb_by_resource.insert(entry.resource_id.as_str(), entry);
        }

        let mut devices: BTreeMap<DeviceKey, Device> = BTreeMap::new();

        // Pass 1: seed from live ports on the tracked radio.
        for port in ports {
            let Some(rid) = port.resource_id() else {
                tracing::warn!(port = %port.id, "malformed port id, skipping");
                continue;
            };
            let Some((res, class)) = tracked.get(rid.as_str()) else {
                continue;
            };
            if port.phantom || port.down {
                continue;
            }
            if port.parent_dev != TRACKED_PARENT_DEV {
                continue;
            }
            if res.ctrl_ip.is_empty() {
                tracing::warn!(port = %port.id, "resource has no ctrl IP, skipping");
                continue;
            }

            let key = DeviceKey::new(&port.id);
            let seed = Device {
                key: key.clone(),
                ip: res.ctrl_ip.clone(),
                hostname: res.hostname.clone(),
                mac: port.mac.clone(),
                ssid: port.ssid.clone(),
                channel: port.channel.clone(),
                device_type: *class,
                serial: String::new(),
            };
            match devices.get_mut(&key) {
                Some(existing) => merge_preferring_non_empty(existing, &seed),
                None => {
                    devices.insert(key, seed);
                }
            }
        }

        // Pass 2: collapse Android rows onto serial-derived keys.
        for (rid, (res, class)) in &tracked {
            if *class != DeviceClass::Android {
                continue;
            }
            let Some(entry) = adb_by_resource.get(rid) else {
                tracing::debug!(resource = %rid, "Android resource has no ADB registration");
                continue;
            };

            let serial_key = DeviceKey::new(entry.serial());
            // The transient wireless port row this registration replaces.
            let port_key = DeviceKey::new(format!("{rid}.wlan0"));
            let wlan_row = devices.remove(&port_key);
            let wlan = wlan_row.as_ref();

            let pick = |primary: &str, fallback: Option<&str>| -> String {
                if !primary.is_empty() {
                    primary.to_string()
                } else {
                    fallback.unwrap_or_default().to_string()
                }
            };

            let serial_row = Device {
                key: serial_key.clone(),
                ip: pick(&res.ctrl_ip, wlan.map(|w| w.ip.as_str())),
                hostname: pick(
                    &entry.user_name,
                    Some(&pick(&res.hostname, wlan.map(|w| w.hostname.as_str()))),
                ),
                mac: pick(&entry.wifi_mac, wlan.map(|w| w.mac.as_str())),
                ssid: wlan.map(|w| w.ssid.clone()).unwrap_or_default(),
                channel: wlan.map(|w| w.channel.clone()).unwrap_or_default(),
                device_type: DeviceClass::Android,
                serial: entry.serial().to_string(),
            };

            match devices.get_mut(&serial_key) {
                Some(existing) => merge_preferring_non_empty(existing, &serial_row),
                None => {
                    devices.insert(serial_key, serial_row);
                }
            }
        }

        // Pass 3: rows with the same non-empty IP are one physical device.
        let devices = dedup_by_ip(devices);

        if devices.is_empty() {
            return Err(RegistryError::EmptyRoster);
        }

        let by_ip = devices
            .values()
            .filter(|d| !d.ip.is_empty())
            .map(|d| (d.ip.clone(), d.key.clone()))
            .collect();

        Ok(Self { devices, by_ip })
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&Device> {
        self.devices.get(key)
    }

    pub fn get_by_ip(&self, ip: &str) -> Option<&Device> {
        self.by_ip.get(ip).and_then(|k| self.devices.get(k))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The full roster in report order: by hostname, then by IP.
    pub fn roster(&self) -> Vec<Device> {
        let mut roster: Vec<Device> = self.devices.values().cloned().collect();
        roster.sort_by(|a, b| {
            a.hostname
                .cmp(&b.hostname)
                .then_with(|| a.ip.cmp(&b.ip))
        });
        roster
    }

    /// Per-class device counts for the run-start summary, e.g.
    /// `"Android(2) Windows(1)"`.
    pub fn class_summary(&self) -> String {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for dev in self.devices.values() {
            *counts.entry(dev.device_type.to_string()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(class, n)| format!("{class}({n})"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Collapse rows sharing a non-empty IP. The wireless-interface key is
/// canonical; when neither or both keys are wireless, the
/// lexicographically smaller key wins (deterministic, order-independent).
fn dedup_by_ip(devices: BTreeMap<DeviceKey, Device>) -> BTreeMap<DeviceKey, Device> {
    let mut out: BTreeMap<DeviceKey, Device> = BTreeMap::new();
    let mut ip_to_key: HashMap<String, DeviceKey> = HashMap::new();

    for (key, device) in devices {
        if device.ip.is_empty() {
            out.insert(key, device);
            continue;
        }

        let Some(existing_key) = ip_to_key.get(&device.ip).cloned() else {
            ip_to_key.insert(device.ip.clone(), key.clone());
            out.insert(key, device);
            continue;
        };

        let keep_new = match (key.is_wireless(), existing_key.is_wireless()) {
            (true, false) => true,
            (false, true) => false,
            _ => key < existing_key,
        };

        if keep_new {
            let mut winner = device;
            if let Some(loser) = out.remove(&existing_key) {
                merge_preferring_non_empty(&mut winner, &loser);
            }
            ip_to_key.insert(winner.ip.clone(), key.clone());
            out.insert(key, winner);
        } else if let Some(winner) = out.get_mut(&existing_key) {
            merge_preferring_non_empty(winner, &device);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(id: &str, parent: &str) -> PortEntry {
        PortEntry {
            id: id.into(),
            phantom: false,
            down: false,
            parent_dev: parent.into(),
            ssid: "lab-ssid".into(),
            channel: "36".into(),
            mac: format!("MAC-{id}"),
        }
    }

    fn resource(id: &str, ip: &str, hostname: &str, device_type: &str) -> ResourceEntry {
        ResourceEntry {
            id: id.into(),
            ctrl_ip: ip.into(),
            hostname: hostname.into(),
            device_type: device_type.into(),
        }
    }

    fn adb(name: &str, resource_id: &str, user_name: &str, wifi_mac: &str) -> AdbEntry {
        AdbEntry {
            name: name.into(),
            resource_id: resource_id.into(),
            user_name: user_name.into(),
            wifi_mac: wifi_mac.into(),
        }
    }

    fn device(key: &str) -> Device {
        Device {
            key: DeviceKey::new(key),
            ip: String::new(),
            hostname: String::new(),
            mac: String::new(),
            ssid: String::new(),
            channel: String::new(),
            device_type: DeviceClass::Linux,
            serial: String::new(),
        }
    }

    #[test]
    fn seeds_from_live_tracked_ports_only() {
        let mut phantom = port("1.10.wlan0", TRACKED_PARENT_DEV);
        phantom.phantom = true;
        let mut down = port("1.12.wlan0", TRACKED_PARENT_DEV);
        down.down = true;
        let ports = vec![
            port("1.11.wlan0", TRACKED_PARENT_DEV),
            phantom,
            down,
            port("1.13.wlan0", "wiphy1"),
        ];
        let resources = vec![
            resource("1.10", "10.0.0.10", "a", "Linux/Interop"),
            resource("1.11", "10.0.0.11", "b", "Linux/Interop"),
            resource("1.12", "10.0.0.12", "c", "Linux/Interop"),
            resource("1.13", "10.0.0.13", "d", "Linux/Interop"),
        ];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&DeviceKey::new("1.11.wlan0")).is_some());
    }

    #[test]
    fn untracked_class_and_missing_ctrl_ip_are_skipped() {
        let ports = vec![
            port("1.1.wlan0", TRACKED_PARENT_DEV),
            port("1.2.wlan0", TRACKED_PARENT_DEV),
            port("1.3.wlan0", TRACKED_PARENT_DEV),
        ];
        let resources = vec![
            resource("1.1", "10.0.0.1", "kept", "Windows"),
            resource("1.2", "10.0.0.2", "ap", "vAP"),
            resource("1.3", "", "no-ip", "Windows"),
        ];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.roster()[0].hostname, "kept");
    }

    #[test]
    fn android_rows_collapse_onto_serial_key() {
        let ports = vec![port("1.11.wlan0", TRACKED_PARENT_DEV)];
        let resources = vec![resource("1.11", "10.0.0.21", "box-host", "Android")];
        let adb_entries = vec![adb("1.1.R9ZW9098RMZ", "1.11", "pixel-7", "AA:BB")];

        let reg = DeviceRegistry::build(&ports, &adb_entries, &resources).unwrap();
        assert_eq!(reg.len(), 1);

        let dev = reg.get(&DeviceKey::new("R9ZW9098RMZ")).unwrap();
        assert_eq!(dev.serial, "R9ZW9098RMZ");
        assert_eq!(dev.ip, "10.0.0.21");
        // Friendly ADB name beats the box hostname.
        assert_eq!(dev.hostname, "pixel-7");
        // ADB wifi mac beats the port mac.
        assert_eq!(dev.mac, "AA:BB");
        // ssid/channel survive from the absorbed wireless port row.
        assert_eq!(dev.ssid, "lab-ssid");
        assert_eq!(dev.channel, "36");
        // The transient port key is gone.
        assert!(reg.get(&DeviceKey::new("1.11.wlan0")).is_none());
    }

    #[test]
    fn android_without_adb_registration_keeps_port_row() {
        let ports = vec![port("1.11.wlan0", TRACKED_PARENT_DEV)];
        let resources = vec![resource("1.11", "10.0.0.21", "box-host", "Android")];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert!(reg.get(&DeviceKey::new("1.11.wlan0")).is_some());
    }

    #[test]
    fn adb_entry_without_linkage_is_dropped() {
        let ports = vec![port("1.11.wlan0", TRACKED_PARENT_DEV)];
        let resources = vec![resource("1.11", "10.0.0.21", "box-host", "Android")];
        let adb_entries = vec![adb("1.1.SERIAL1", "", "orphan", "")];

        let reg = DeviceRegistry::build(&ports, &adb_entries, &resources).unwrap();
        // The orphan registration never merged; the port row survives.
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&DeviceKey::new("1.11.wlan0")).is_some());
    }

    #[test]
    fn first_non_empty_wins_is_symmetric() {
        let mut a = device("x");
        a.mac = "AA".into();
        let mut b = device("x");
        b.ip = "10.0.0.1".into();

        let mut ab = a.clone();
        merge_preferring_non_empty(&mut ab, &b);
        let mut ba = b.clone();
        merge_preferring_non_empty(&mut ba, &a);

        assert_eq!(ab.ip, "10.0.0.1");
        assert_eq!(ab.mac, "AA");
        assert_eq!(ba.ip, "10.0.0.1");
        assert_eq!(ba.mac, "AA");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut dst = device("x");
        dst.ip = "10.0.0.1".into();
        let mut src = device("x");
        src.mac = "AA".into();
        src.hostname = "h".into();

        merge_preferring_non_empty(&mut dst, &src);
        let once = dst.clone();
        merge_preferring_non_empty(&mut dst, &src);
        assert_eq!(dst, once);
    }

    #[test]
    fn build_is_idempotent_over_duplicate_port_entries() {
        let ports = vec![
            port("1.11.wlan0", TRACKED_PARENT_DEV),
            port("1.11.wlan0", TRACKED_PARENT_DEV),
        ];
        let resources = vec![resource("1.11", "10.0.0.11", "b", "Windows")];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_ip_prefers_wireless_key() {
        // Two port rows ending up with the same ctrl IP: the wlan one wins.
        let ports = vec![
            port("1.11.eth0", TRACKED_PARENT_DEV),
            port("1.12.wlan0", TRACKED_PARENT_DEV),
        ];
        let resources = vec![
            resource("1.11", "10.0.0.5", "same-box", "Linux/Interop"),
            resource("1.12", "10.0.0.5", "same-box", "Linux/Interop"),
        ];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&DeviceKey::new("1.12.wlan0")).is_some());
        assert_eq!(reg.get_by_ip("10.0.0.5").unwrap().key.as_str(), "1.12.wlan0");
    }

    #[test]
    fn duplicate_ip_tie_breaks_lexicographically() {
        let ports = vec![
            port("1.12.eth0", TRACKED_PARENT_DEV),
            port("1.11.eth0", TRACKED_PARENT_DEV),
        ];
        let resources = vec![
            resource("1.11", "10.0.0.5", "same-box", "Linux/Interop"),
            resource("1.12", "10.0.0.5", "same-box", "Linux/Interop"),
        ];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&DeviceKey::new("1.11.eth0")).is_some());
    }

    #[test]
    fn empty_inventories_are_fatal() {
        assert!(matches!(
            DeviceRegistry::build(&[], &[], &[]),
            Err(RegistryError::EmptyRoster)
        ));
    }

    #[test]
    fn roster_sorted_by_hostname_then_ip() {
        let ports = vec![
            port("1.1.wlan0", TRACKED_PARENT_DEV),
            port("1.2.wlan0", TRACKED_PARENT_DEV),
            port("1.3.wlan0", TRACKED_PARENT_DEV),
        ];
        let resources = vec![
            resource("1.1", "10.0.0.2", "zeta", "Windows"),
            resource("1.2", "10.0.0.1", "alpha", "Windows"),
            resource("1.3", "10.0.0.3", "alpha", "Windows"),
        ];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        let roster = reg.roster();
        let order: Vec<(&str, &str)> = roster
            .iter()
            .map(|d| (d.hostname.as_str(), d.ip.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("alpha", "10.0.0.1"), ("alpha", "10.0.0.3"), ("zeta", "10.0.0.2")]
        );
    }

    #[test]
    fn class_summary_counts() {
        let ports = vec![
            port("1.1.wlan0", TRACKED_PARENT_DEV),
            port("1.2.wlan0", TRACKED_PARENT_DEV),
        ];
        let resources = vec![
            resource("1.1", "10.0.0.1", "a", "Windows"),
            resource("1.2", "10.0.0.2", "b", "Mac OS"),
        ];

        let reg = DeviceRegistry::build(&ports, &[], &resources).unwrap();
        assert_eq!(reg.class_summary(), "Mac OS(1) Windows(1)");
    }
}
