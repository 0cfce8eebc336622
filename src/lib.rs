//! `gripscan` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process
//! exit codes. The core logic lives in [`crate::app`] where it can be tested
//! deterministically with an injected scanner + injected output streams.

pub mod advert;
pub mod app;
pub mod classify;
pub mod duration;
pub mod mac_address;
pub mod observation;
pub mod output;
pub mod registry;
pub mod scanner;
pub mod session;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advert::{AdvertEvent, AdvertPayload, parse_grip};
pub use classify::{Classifier, DEFAULT_KEYWORDS};
pub use duration::parse_duration;
pub use mac_address::MacAddress;
pub use observation::Observation;
pub use output::Presenter;
pub use output::text::TextPresenter;
pub use registry::DeviceRegistry;
pub use scanner::{Backend, EventError, EventResult, PermissionStatus, ScanError};
pub use session::{ScanSession, SessionError, SessionState};
