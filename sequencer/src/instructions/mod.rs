//! Leaf instructions
//!
//! Every instruction validates against mediator snapshots and acts through
//! mediator calls only. Their persisted configuration structs live next to
//! them and are referenced by [`crate::definition::ItemKind`].

pub mod camera;
pub mod dome;
pub mod filter_wheel;
pub mod focuser;
pub mod guider;
pub mod switch;
pub mod telescope;
pub mod utility;

/// Push an issue when a device is not connected
pub(crate) fn require_connected(issues: &mut Vec<String>, connected: bool, device: &str) {
    if !connected {
        issues.push(format!("{} is not connected", device));
    }
}
