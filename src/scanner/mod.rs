//! BLE scanner abstraction.
//!
//! This module provides a channel-based abstraction over different
//! Bluetooth scanning backends. A backend delivers raw advertisement
//! sightings ([`crate::advert::AdvertEvent`]); all classification and
//! parsing happens downstream in the session.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::advert::AdvertEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Per-event errors carried in the event channel.
///
/// These are transient: a single device could not be read or a single
/// advertising report was malformed. They are surfaced only in verbose mode
/// and never abort the scan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// Reading a discovered device's properties failed
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// An advertising report could not be parsed
    #[error("Malformed advertising report: {0}")]
    MalformedReport(String),
}

/// Convenience alias for advertisement sightings or per-event errors.
pub type EventResult = Result<AdvertEvent, EventError>;

/// Errors that abort starting (or probing) a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth session or adapter setup failed
    #[error("Bluetooth initialization failed: {0}")]
    Init(String),
    /// The adapter exists but scanning is not permitted
    #[error("Bluetooth permission denied: {0}")]
    PermissionDenied(String),
    /// The scan request itself was rejected
    #[error("failed to start scan: {0}")]
    StartFailed(String),
    /// Ceasing the scan was rejected
    #[error("failed to stop scan: {0}")]
    StopFailed(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Bluetooth AD type for the shortened local name (0x08).
#[cfg(feature = "hci")]
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;

/// Bluetooth AD type for the complete local name (0x09).
#[cfg(feature = "hci")]
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// Bluetooth AD type for 16-bit-UUID service data (0x16).
#[cfg(feature = "hci")]
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;

/// Bluetooth AD type for manufacturer-specific data (0xFF).
#[cfg(feature = "hci")]
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Channel buffer size for advertisement events.
pub const EVENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Adapter and permission state, the CLI analog of the original app's
/// "request permissions" button.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionStatus {
    /// A Bluetooth adapter was found.
    pub adapter_present: bool,
    /// Scanning is currently possible (adapter powered / socket capability
    /// granted).
    pub scan_allowed: bool,
    /// Backend-specific explanation when scanning is not allowed.
    pub detail: Option<String>,
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Start scanning for nearby BLE devices using the specified backend.
///
/// Dispatches to the appropriate backend implementation. The backend scans
/// until the returned receiver is dropped; dropping it ends the backend
/// task and releases its Bluetooth resources, which is how a scan stop is
/// requested.
///
/// # Arguments
/// * `backend` - The scanner backend to use
/// * `verbose` - If true, per-event errors are sent as Err values;
///   otherwise they're silently dropped.
pub async fn start_scan(
    backend: Backend,
    verbose: bool,
) -> Result<mpsc::Receiver<EventResult>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(verbose).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(verbose).await,
    }
}

/// Probe whether the selected backend could scan right now.
///
/// Unlike [`start_scan`], denied permissions are reported as a status, not
/// an error, so the CLI can tell the user what is missing.
pub async fn check_permissions(backend: Backend) -> Result<PermissionStatus, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::check_permissions().await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::check_permissions(),
    }
}
