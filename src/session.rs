//! Scan session state machine.
//!
//! A session is either idle or scanning. Starting clears the registry and
//! hands control to a scanner backend; stopping reports the final device
//! count. The registry outlives `finish` so the final listing can still be
//! rendered; it is cleared by the next `begin`.

use crate::advert::{AdvertEvent, parse_grip};
use crate::classify::Classifier;
use crate::mac_address::MacAddress;
use crate::observation::Observation;
use crate::registry::DeviceRegistry;
use std::time::SystemTime;
use thiserror::Error;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
}

/// Soft rejections from the state machine.
#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    /// `begin` while a scan is running. The session and registry are left
    /// untouched; callers treat this as a no-op.
    #[error("scan already in progress")]
    AlreadyScanning,
}

/// Owns the scanning state and the device set collected while scanning.
#[derive(Debug, Default)]
pub struct ScanSession {
    state: SessionState,
    registry: DeviceRegistry,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Transition `Idle -> Scanning`, clearing the previous session's
    /// devices.
    ///
    /// The caller is expected to start the scanner backend next and to call
    /// [`ScanSession::abort`] if that fails.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Scanning {
            return Err(SessionError::AlreadyScanning);
        }
        self.registry.clear();
        self.state = SessionState::Scanning;
        Ok(())
    }

    /// Revert to `Idle` after the scanner backend failed to start.
    pub fn abort(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Transition `Scanning -> Idle`, reporting the number of devices seen.
    ///
    /// Returns `None` (and does nothing) when already idle.
    pub fn finish(&mut self) -> Option<usize> {
        if self.state == SessionState::Idle {
            return None;
        }
        self.state = SessionState::Idle;
        Some(self.registry.len())
    }

    /// Record one advertisement sighting.
    ///
    /// Classifies the device name, parses the payload for target devices,
    /// and upserts the result. Returns the stored observation, or `None`
    /// when the session is idle (late events after stop are dropped).
    pub fn observe(&mut self, event: &AdvertEvent, classifier: &Classifier) -> Option<Observation> {
        if self.state != SessionState::Scanning {
            return None;
        }

        let is_target = classifier.is_target(event.name.as_deref());
        let grip = if is_target {
            parse_grip(&event.payload)
        } else {
            None
        };

        let observation = Observation {
            mac: event.mac,
            name: event.name.clone(),
            rssi: event.rssi,
            observed_at: SystemTime::now(),
            is_target,
            grip,
        };
        self.registry.upsert(observation.clone());
        Some(observation)
    }

    /// Last-known observation for a device this session.
    pub fn device(&self, mac: &MacAddress) -> Option<&Observation> {
        self.registry.get(mac)
    }
}
