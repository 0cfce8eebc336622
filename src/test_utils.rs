use crate::advert::{AdvertEvent, AdvertPayload};
use crate::mac_address::MacAddress;
use crate::observation::Observation;
use std::time::SystemTime;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// An advertisement event without any vendor payload.
pub fn advert_event(mac: MacAddress, name: Option<&str>, rssi: i16) -> AdvertEvent {
    AdvertEvent {
        mac,
        name: name.map(str::to_string),
        rssi,
        payload: AdvertPayload::default(),
    }
}

/// An advertisement event carrying manufacturer data.
pub fn grip_event(mac: MacAddress, name: &str, rssi: i16, manufacturer: &[u8]) -> AdvertEvent {
    AdvertEvent {
        mac,
        name: Some(name.to_string()),
        rssi,
        payload: AdvertPayload {
            manufacturer_data: Some(manufacturer.to_vec()),
            service_data: Default::default(),
        },
    }
}

/// A minimal observation for registry tests.
pub fn observation(mac: [u8; 6], rssi: i16) -> Observation {
    Observation {
        mac: MacAddress(mac),
        name: None,
        rssi,
        observed_at: SystemTime::UNIX_EPOCH,
        is_target: false,
        grip: None,
    }
}
