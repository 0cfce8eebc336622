//! Presentation of scan results.
//!
//! This module provides a trait for rendering observations and a plain-text
//! implementation. Rendering is pure string building; deciding what to
//! render and when is the run loop's job.

pub mod text;

use crate::observation::Observation;
use crate::scanner::PermissionStatus;

/// Renders registry state and grip readings for an output surface.
pub trait Presenter: Send + Sync {
    /// One line for a single observation: name, target marker, signal
    /// strength, address, and the grip value when present.
    fn device_line(&self, observation: &Observation) -> String;

    /// The full device listing, strongest signal first.
    fn device_list(&self, observations: &[Observation]) -> String;

    /// Transient highlight for a freshly parsed grip reading.
    fn grip_highlight(&self, kilograms: f64) -> String;

    /// Final line reporting how many devices the session saw.
    fn summary(&self, device_count: usize) -> String;

    /// Outcome of the adapter/permission probe.
    fn permission_status(&self, status: &PermissionStatus) -> String;
}
