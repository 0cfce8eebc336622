//! Plain-text presenter.

use crate::observation::Observation;
use crate::output::Presenter;
use crate::scanner::PermissionStatus;
use std::fmt::Write;

/// Name shown for devices that do not advertise one.
const UNKNOWN_NAME: &str = "(unknown)";

/// Line-oriented presenter for terminals and pipes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPresenter;

impl TextPresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Presenter for TextPresenter {
    fn device_line(&self, observation: &Observation) -> String {
        let name = observation.name.as_deref().unwrap_or(UNKNOWN_NAME);
        let marker = if observation.is_target { " *" } else { "" };

        let mut line = format!(
            "{name}{marker}  rssi={} dBm  mac={}",
            observation.rssi, observation.mac
        );
        if let Some(kg) = observation.grip {
            // Infallible for String
            let _ = write!(line, "  grip={kg:.1} kg");
        }
        line
    }

    fn device_list(&self, observations: &[Observation]) -> String {
        if observations.is_empty() {
            return "no devices found".to_string();
        }

        let mut out = format!("{} devices, strongest signal first:", observations.len());
        for observation in observations {
            let _ = write!(out, "\n  {}", self.device_line(observation));
        }
        out
    }

    fn grip_highlight(&self, kilograms: f64) -> String {
        format!(">>> grip {kilograms:.1} kg")
    }

    fn summary(&self, device_count: usize) -> String {
        format!("scan stopped ({device_count} devices seen)")
    }

    fn permission_status(&self, status: &PermissionStatus) -> String {
        let mut out = format!(
            "adapter: {}\nscanning allowed: {}",
            if status.adapter_present { "present" } else { "not found" },
            if status.scan_allowed { "yes" } else { "no" },
        );
        if let Some(detail) = &status.detail {
            let _ = write!(out, "\ndetail: {detail}");
        }
        out
    }
}
