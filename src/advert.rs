//! Advertisement events and the grip-strength payload parser.
//!
//! The payload layout is not a standardized protocol. The parser implements
//! the heuristic used by the original device prototype: a big-endian 16-bit
//! value hidden in manufacturer data (tenths of a kilogram) or, failing
//! that, in the first service-data entry (whole units).

use crate::mac_address::MacAddress;
use std::collections::BTreeMap;

/// Vendor payload attached to an advertisement.
///
/// Both fields are optional because advertisement content varies by device:
/// some broadcast manufacturer-specific data, some attach data to a service
/// UUID, many carry neither. Service-data keys are canonical lowercase UUID
/// strings so all scanner backends agree on the representation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdvertPayload {
    /// Manufacturer-specific data, company identifier stripped.
    pub manufacturer_data: Option<Vec<u8>>,
    /// Service UUID to data bytes, in key order.
    pub service_data: BTreeMap<String, Vec<u8>>,
}

/// A single advertisement sighting delivered by a scanner backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertEvent {
    /// Address of the advertising device.
    pub mac: MacAddress,
    /// Advertised local name, if the device broadcasts one.
    pub name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Vendor payload carried in the advertisement.
    pub payload: AdvertPayload,
}

/// Extract a grip-strength reading in kilograms from an advertisement
/// payload.
///
/// Heuristic, in priority order:
/// 1. Manufacturer data of at least 4 bytes: big-endian u16 at bytes 2..4,
///    scaled by 1/10.
/// 2. First service-data entry of at least 2 bytes: big-endian u16 of the
///    leading bytes, unscaled.
///
/// Anything shorter or absent yields `None`. Malformed payloads are never
/// an error; absence of a value is the only failure mode.
///
/// TODO: replace offsets and scaling with the vendor's real advertisement
/// layout once the dynamometer protocol is documented.
pub fn parse_grip(payload: &AdvertPayload) -> Option<f64> {
    if let Some(data) = &payload.manufacturer_data
        && data.len() >= 4
    {
        let raw = u16::from_be_bytes([data[2], data[3]]);
        return Some(f64::from(raw) / 10.0);
    }

    for bytes in payload.service_data.values() {
        if bytes.len() >= 2 {
            let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
            return Some(f64::from(raw));
        }
    }

    None
}
