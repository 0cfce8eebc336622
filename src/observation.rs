//! Last-known observation of a scanned device.

use crate::mac_address::MacAddress;

/// What the registry remembers about one device.
///
/// Exactly one observation is kept per MAC address; a newer sighting
/// replaces the older one wholesale. Nothing is persisted across sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Device address, unique per registry entry.
    pub mac: MacAddress,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// When the advertisement was seen.
    pub observed_at: std::time::SystemTime,
    /// Whether the name matched the grip-device keyword set.
    pub is_target: bool,
    /// Parsed grip-strength reading in kilograms, target devices only.
    pub grip: Option<f64>,
}
