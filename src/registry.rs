//! Per-session device registry.
//!
//! Owns the set of devices seen during one scan session, keyed by MAC
//! address. The session clears it on every restart; there is no history and
//! no persistence.

use crate::mac_address::MacAddress;
use crate::observation::Observation;
use std::collections::HashMap;

/// Mapping from device address to its last-known observation.
///
/// Entries additionally remember their insertion order so that the sorted
/// listing breaks RSSI ties deterministically.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Observations in first-seen order.
    entries: Vec<Observation>,
    /// Index into `entries` per address.
    index: HashMap<MacAddress, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for the observation's address.
    pub fn upsert(&mut self, observation: Observation) {
        match self.index.get(&observation.mac) {
            Some(&slot) => self.entries[slot] = observation,
            None => {
                self.index.insert(observation.mac, self.entries.len());
                self.entries.push(observation);
            }
        }
    }

    /// Drop all entries. Called when a new scan session begins.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Last-known observation for an address, if the device has been seen.
    pub fn get(&self, mac: &MacAddress) -> Option<&Observation> {
        self.index.get(mac).map(|&slot| &self.entries[slot])
    }

    /// Fresh snapshot of all observations, strongest signal first.
    ///
    /// Ties keep first-seen order (stable sort). The snapshot is detached
    /// from the registry; later upserts do not affect it.
    pub fn sorted_by_signal(&self) -> Vec<Observation> {
        let mut snapshot = self.entries.clone();
        snapshot.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        snapshot
    }

    /// Number of distinct devices seen this session.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
